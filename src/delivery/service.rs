//! Notification dispatch and lifecycle

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Deliver, DeliveryError};
use crate::models::{Context, Meeting, Notification, NotificationChannel, NotificationStatus, User};
use crate::store::Store;

/// Attendees also receive a reminder when the meeting starts within this window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastPolicy {
    pub window_minutes: i64,
}

impl BroadcastPolicy {
    pub fn new(window_minutes: i64) -> Self {
        Self { window_minutes }
    }

    pub fn applies(&self, minutes_until: i64) -> bool {
        minutes_until > 0 && minutes_until <= self.window_minutes
    }
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self::new(35)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification not found: {0}")]
    NotFound(String),

    #[error("Notification {id} is {status}")]
    InvalidState { id: String, status: NotificationStatus },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// What happened to one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Owner delivery succeeded; `attendees` counts successful broadcast deliveries
    Sent { attendees: usize },
    Failed(String),
    /// The meeting was cancelled before the reminder fired
    Cancelled,
    /// The row left `scheduled` while delivery was in flight; its state was kept
    Superseded,
}

/// Resolves recipients for a notification and records the delivery result
pub struct NotificationService {
    store: Store,
    delivery: Arc<dyn Deliver>,
    policy: BroadcastPolicy,
}

impl NotificationService {
    pub fn new(store: Store, delivery: Arc<dyn Deliver>, policy: BroadcastPolicy) -> Self {
        Self {
            store,
            delivery,
            policy,
        }
    }

    pub fn policy(&self) -> BroadcastPolicy {
        self.policy
    }

    /// Deliver one notification and move it out of `scheduled`.
    ///
    /// Store errors propagate and leave the row untouched so the next tick retries it.
    pub async fn dispatch(&self, notification: &Notification, now: DateTime<Utc>) -> Result<DispatchOutcome> {
        let meeting = match self.store.get_meeting(&notification.meeting_id)? {
            Some(m) => m,
            None => return self.fail(notification, "meeting not found"),
        };
        let user = match self.active_user(&notification.user_id)? {
            Some(u) => u,
            None => return self.fail(notification, "user not found"),
        };

        if meeting.is_cancelled {
            self.store.cancel_notification(&notification.id)?;
            debug!("Notification {} cancelled with meeting {}", notification.id, meeting.id);
            return Ok(DispatchOutcome::Cancelled);
        }

        let context = self.store.context_for_meeting(&meeting.id)?;
        let minutes_until = meeting.minutes_until(now);

        let owner_result = match owner_address(notification.channel, &user) {
            Ok(address) => {
                self.delivery
                    .deliver(notification.channel, &address, &meeting, context.as_ref(), minutes_until)
                    .await
            }
            Err(e) => Err(e),
        };

        let attendees = if self.policy.applies(minutes_until) {
            self.broadcast(&meeting, &user, context.as_ref(), minutes_until).await
        } else {
            0
        };

        match owner_result {
            Ok(()) => {
                if !self.store.mark_notification_sent(&notification.id, now)? {
                    return Ok(self.superseded(notification));
                }
                info!(
                    "Sent {} reminder for '{}' ({} min, {} attendees)",
                    notification.channel, meeting.title, minutes_until, attendees
                );
                Ok(DispatchOutcome::Sent { attendees })
            }
            Err(e) => self.fail(notification, &e.to_string()),
        }
    }

    /// Email every attendee except the owner, once per address
    async fn broadcast(
        &self,
        meeting: &Meeting,
        owner: &User,
        context: Option<&Context>,
        minutes_until: i64,
    ) -> usize {
        let mut seen = HashSet::new();
        seen.insert(owner.email.to_lowercase());

        let mut delivered = 0;
        for email in meeting.attendee_emails() {
            if !seen.insert(email.to_lowercase()) {
                continue;
            }
            match self
                .delivery
                .deliver(NotificationChannel::Email, &email, meeting, context, minutes_until)
                .await
            {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Attendee reminder to {} failed: {}", email, e),
            }
        }
        delivered
    }

    fn fail(&self, notification: &Notification, reason: &str) -> Result<DispatchOutcome> {
        if !self.store.mark_notification_failed(&notification.id, reason)? {
            return Ok(self.superseded(notification));
        }
        warn!("Notification {} failed: {}", notification.id, reason);
        Ok(DispatchOutcome::Failed(reason.to_string()))
    }

    fn superseded(&self, notification: &Notification) -> DispatchOutcome {
        warn!(
            "Notification {} changed state during delivery; keeping the newer state",
            notification.id
        );
        DispatchOutcome::Superseded
    }

    fn active_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.store.get_user(id)?.filter(|u| u.deleted_at.is_none()))
    }

    /// Create one notification per (offset, channel). Offsets already in the past are skipped.
    pub fn schedule_reminders(
        &self,
        meeting: &Meeting,
        minutes_before: &[i64],
        channels: &[NotificationChannel],
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>> {
        let mut offsets: Vec<i64> = minutes_before.iter().copied().filter(|m| *m >= 0).collect();
        offsets.sort_unstable_by(|a, b| b.cmp(a));
        offsets.dedup();

        let mut created = Vec::new();
        for offset in offsets {
            let at = meeting.start_time - Duration::minutes(offset);
            if at < now {
                debug!("Skipping {}-minute reminder for '{}': already past", offset, meeting.title);
                continue;
            }
            for channel in channels {
                created.push(self.store.create_notification(&meeting.id, &meeting.user_id, *channel, at)?);
            }
        }
        Ok(created)
    }

    /// `scheduled -> cancelled`
    pub fn cancel(&self, id: &str) -> Result<Notification, NotificationError> {
        let current = self.load(id)?;
        if !self.store.cancel_notification(id)? {
            return Err(NotificationError::InvalidState {
                id: id.to_string(),
                status: current.status,
            });
        }
        self.load(id)
    }

    /// Retry a failed notification now
    pub async fn resend(&self, id: &str, now: DateTime<Utc>) -> Result<DispatchOutcome, NotificationError> {
        let current = self.load(id)?;
        if !self.store.begin_retry(id)? {
            return Err(NotificationError::InvalidState {
                id: id.to_string(),
                status: current.status,
            });
        }
        let retried = self.load(id)?;
        info!("Resending notification {} (attempt {})", id, retried.retry_count);
        Ok(self.dispatch(&retried, now).await?)
    }

    /// Tell the owner and attendees a meeting was created. Returns successful deliveries.
    pub async fn send_creation_confirmation(&self, meeting_id: &str) -> Result<usize> {
        let meeting = self
            .store
            .get_meeting(meeting_id)?
            .ok_or_else(|| anyhow::anyhow!("Meeting not found: {}", meeting_id))?;
        let owner = self
            .active_user(&meeting.user_id)?
            .ok_or_else(|| anyhow::anyhow!("User not found: {}", meeting.user_id))?;

        let mut seen = HashSet::new();
        let recipients: Vec<String> = std::iter::once(owner.email.clone())
            .chain(meeting.attendee_emails())
            .filter(|e| seen.insert(e.to_lowercase()))
            .collect();

        let mut delivered = 0;
        for email in &recipients {
            match self
                .delivery
                .deliver(NotificationChannel::Email, email, &meeting, None, 0)
                .await
            {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Creation confirmation to {} failed: {}", email, e),
            }
        }
        Ok(delivered)
    }

    fn load(&self, id: &str) -> Result<Notification, NotificationError> {
        self.store
            .get_notification(id)?
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))
    }
}

fn owner_address(channel: NotificationChannel, user: &User) -> Result<String, DeliveryError> {
    match channel {
        NotificationChannel::Email => Ok(user.email.clone()),
        NotificationChannel::Telegram => user
            .telegram_chat_id
            .map(|id| id.to_string())
            .ok_or_else(|| DeliveryError::MissingRecipient(format!("user {} has no telegram chat", user.id))),
        NotificationChannel::Sms => Err(DeliveryError::Unsupported(channel)),
    }
}
