//! Reminder dispatch agent

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::Agent;
use crate::delivery::{DispatchOutcome, NotificationService};
use crate::store::Store;

/// Sends every scheduled notification whose time has come
pub struct NotificationAgent {
    store: Store,
    service: Arc<NotificationService>,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl NotificationAgent {
    pub fn new(store: Store, service: Arc<NotificationService>) -> Self {
        Self {
            store,
            service,
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn notifications_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// One pass at `now`. Each notification is handled on its own; one bad row
    /// doesn't hold back the rest.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.store.due_notifications(now)?;
        if due.is_empty() {
            debug!("No notifications due");
            return Ok(0);
        }

        let mut sent = 0;
        for notification in &due {
            match self.service.dispatch(notification, now).await {
                Ok(DispatchOutcome::Sent { .. }) => {
                    sent += 1;
                    self.sent.fetch_add(1, Ordering::Relaxed);
                }
                Ok(DispatchOutcome::Failed(_)) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(DispatchOutcome::Cancelled | DispatchOutcome::Superseded) => {}
                Err(e) => {
                    error!("Error dispatching notification {}: {:#}", notification.id, e);
                }
            }
        }

        info!("Processed {} due notifications ({} sent)", due.len(), sent);
        Ok(sent)
    }
}

#[async_trait]
impl Agent for NotificationAgent {
    fn name(&self) -> &str {
        "notification"
    }

    async fn tick(&self) -> Result<()> {
        self.run_at(Utc::now()).await.map(|_| ())
    }

    fn counters(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("notifications_sent", self.sent.load(Ordering::Relaxed)),
            ("notifications_failed", self.failed.load(Ordering::Relaxed)),
        ]
    }
}
