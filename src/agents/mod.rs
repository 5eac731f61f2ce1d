//! Background Agents
//!
//! Each agent does one unit of work per tick; an `AgentRunner` drives the
//! tick on a fixed interval until stopped:
//! - **Notification**: dispatches due reminders (60s)
//! - **Context**: generates AI briefs for upcoming meetings (300s)
//! - **Monitor**: syncs external calendars into the meeting store (600s)
//!
//! A failing tick is logged and counted; it never stops the loop.

pub mod context;
pub mod monitor;
pub mod notification;

pub use context::ContextAgent;
pub use monitor::{MonitorAgent, ReminderDefaults, SyncReport};
pub use notification::NotificationAgent;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One periodic unit of background work
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// One pass over the agent's work; an error marks the run as failed
    async fn tick(&self) -> Result<()>;

    /// Domain counters reported alongside run statistics
    fn counters(&self) -> Vec<(&'static str, u64)> {
        Vec::new()
    }
}

/// Run statistics, shared between the loop task and status readers
#[derive(Debug, Default)]
pub struct AgentStats {
    pub total_runs: AtomicU64,
    pub successful_runs: AtomicU64,
    pub failed_runs: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
    last_run_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl AgentStats {
    fn record_start(&self) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        *self.last_run_at.lock() = Some(Utc::now());
    }

    fn record_success(&self) {
        self.successful_runs.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, error: &anyhow::Error) {
        self.failed_runs.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(format!("{:#}", error));
    }

    /// Percentage of completed runs that succeeded, 0 when nothing ran yet
    pub fn success_rate(&self) -> f64 {
        let total = self.total_runs.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let ok = self.successful_runs.load(Ordering::Relaxed) as f64;
        (ok / total as f64 * 10_000.0).round() / 100.0
    }
}

/// Serializable snapshot of one agent
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub name: String,
    pub is_running: bool,
    pub check_interval_seconds: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub success_rate: f64,
    pub last_error: Option<String>,
    pub counters: BTreeMap<String, u64>,
}

struct RunHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Drives an `Agent` on a fixed interval
pub struct AgentRunner {
    agent: Arc<dyn Agent>,
    interval: Duration,
    stop_timeout: Duration,
    stats: Arc<AgentStats>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<RunHandle>>,
}

impl AgentRunner {
    pub fn new(agent: Arc<dyn Agent>, interval: Duration) -> Self {
        Self {
            agent,
            interval,
            stop_timeout: Duration::from_secs(30),
            stats: Arc::new(AgentStats::default()),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Upper bound on how long `stop` waits for an in-flight tick
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        self.agent.name()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    /// Spawn the loop on the current runtime. Starting a running agent is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            warn!("{} agent already running", self.name());
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| anyhow::anyhow!("cannot start {} agent: {}", self.name(), e))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.stats.started_at.lock() = Some(Utc::now());
        self.running.store(true, Ordering::SeqCst);

        let task = runtime.spawn(run_loop(
            self.agent.clone(),
            self.interval,
            self.stats.clone(),
            shutdown_rx,
        ));
        *handle = Some(RunHandle {
            shutdown: shutdown_tx,
            task,
        });

        info!("Started {} agent (every {}s)", self.name(), self.interval.as_secs());
        Ok(())
    }

    /// Signal the loop and wait for the current tick to finish.
    ///
    /// Idempotent. If the tick outlives the stop timeout the task is aborted
    /// and an error returned; the runner is stopped either way.
    pub async fn stop(&self) -> Result<()> {
        let Some(RunHandle { shutdown, task }) = self.handle.lock().take() else {
            return Ok(());
        };
        self.running.store(false, Ordering::SeqCst);
        let _ = shutdown.send(true);

        let abort = task.abort_handle();
        match tokio::time::timeout(self.stop_timeout, task).await {
            Ok(Ok(())) => {
                info!("Stopped {} agent", self.name());
                Ok(())
            }
            Ok(Err(e)) => {
                error!("{} agent task ended abnormally: {}", self.name(), e);
                Err(anyhow::anyhow!("{} agent task failed: {}", self.name(), e))
            }
            Err(_) => {
                abort.abort();
                warn!("{} agent did not stop within {:?}; aborted", self.name(), self.stop_timeout);
                Err(anyhow::anyhow!("{} agent stop timed out", self.name()))
            }
        }
    }

    pub fn status(&self) -> AgentStatus {
        let stats = &self.stats;
        AgentStatus {
            name: self.name().to_string(),
            is_running: self.is_running(),
            check_interval_seconds: self.interval.as_secs(),
            started_at: *stats.started_at.lock(),
            last_run_at: *stats.last_run_at.lock(),
            total_runs: stats.total_runs.load(Ordering::Relaxed),
            successful_runs: stats.successful_runs.load(Ordering::Relaxed),
            failed_runs: stats.failed_runs.load(Ordering::Relaxed),
            success_rate: stats.success_rate(),
            last_error: stats.last_error.lock().clone(),
            counters: self
                .agent
                .counters()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

async fn run_loop(
    agent: Arc<dyn Agent>,
    interval: Duration,
    stats: Arc<AgentStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        stats.record_start();
        let outcome = AssertUnwindSafe(agent.tick())
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(anyhow::anyhow!("tick panicked: {}", panic_message(&*payload))));
        match outcome {
            Ok(()) => {
                stats.record_success();
                debug!(agent = %agent.name(), "tick complete");
            }
            Err(e) => {
                stats.record_failure(&e);
                error!(agent = %agent.name(), "tick failed: {:#}", e);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                // Sender dropped counts as shutdown too
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!(agent = %agent.name(), "loop exited");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
