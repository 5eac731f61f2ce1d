//! Agent Orchestration
//!
//! Owns the set of background agent runners and starts, stops and reports on
//! them as a group. One agent failing to start or stop never affects the others.

use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::agents::{AgentRunner, AgentStatus};

/// Aggregate status across all registered agents
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub orchestrator_running: bool,
    pub total_agents: usize,
    pub running_agents: usize,
    pub stopped_agents: usize,
    pub agents: Vec<AgentStatus>,
}

#[derive(Default)]
pub struct AgentOrchestrator {
    agents: RwLock<Vec<Arc<AgentRunner>>>,
    running: AtomicBool,
}

impl AgentOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a runner. Registering the same runner twice is a no-op.
    pub fn register(&self, runner: Arc<AgentRunner>) {
        let mut agents = self.agents.write();
        if agents.iter().any(|a| Arc::ptr_eq(a, &runner)) {
            warn!("{} agent already registered", runner.name());
            return;
        }
        info!("Registered {} agent", runner.name());
        agents.push(runner);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start every registered agent; returns how many started
    pub fn start_all(&self) -> usize {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return 0;
        }

        let agents = self.agents.read().clone();
        let mut started = 0;
        for agent in &agents {
            match agent.start() {
                Ok(()) => started += 1,
                Err(e) => error!("Failed to start {} agent: {:#}", agent.name(), e),
            }
        }
        info!("Started {}/{} agents", started, agents.len());
        started
    }

    /// Stop every agent concurrently and wait for each to finish its tick
    pub async fn stop_all(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let agents = self.agents.read().clone();
        let results = join_all(agents.iter().map(|a| a.stop())).await;
        for (agent, result) in agents.iter().zip(results) {
            if let Err(e) = result {
                error!("Failed to stop {} agent: {:#}", agent.name(), e);
            }
        }
        info!("All agents stopped");
    }

    pub fn get_status(&self) -> OrchestratorStatus {
        let agents: Vec<AgentStatus> = self.agents.read().iter().map(|a| a.status()).collect();
        let running = agents.iter().filter(|a| a.is_running).count();

        OrchestratorStatus {
            orchestrator_running: self.is_running(),
            total_agents: agents.len(),
            running_agents: running,
            stopped_agents: agents.len() - running,
            agents,
        }
    }

    pub fn get_agent(&self, name: &str) -> Option<Arc<AgentRunner>> {
        self.agents.read().iter().find(|a| a.name() == name).cloned()
    }
}
