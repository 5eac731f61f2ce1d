//! Calendar sync agent

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::Agent;
use crate::delivery::NotificationService;
use crate::models::{Meeting, MeetingPatch, NewMeeting, NotificationChannel, User};
use crate::services::{CalendarEvent, CalendarProvider};
use crate::store::Store;

const UNTITLED: &str = "Untitled Meeting";

/// Per-pass sync totals
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub users: usize,
    pub imported: usize,
    pub updated: usize,
    pub failed_users: usize,
}

/// Reminders created for every newly imported meeting
pub struct ReminderDefaults {
    pub service: Arc<NotificationService>,
    pub minutes_before: Vec<i64>,
    pub channels: Vec<NotificationChannel>,
}

/// Mirrors each connected user's calendar into the meeting store
pub struct MonitorAgent {
    store: Store,
    calendar: Arc<dyn CalendarProvider>,
    window: Duration,
    reminders: Option<ReminderDefaults>,
    imported: AtomicU64,
    updated: AtomicU64,
}

impl MonitorAgent {
    pub fn new(store: Store, calendar: Arc<dyn CalendarProvider>, sync_days: i64) -> Self {
        Self {
            store,
            calendar,
            window: Duration::days(sync_days),
            reminders: None,
            imported: AtomicU64::new(0),
            updated: AtomicU64::new(0),
        }
    }

    pub fn with_reminders(mut self, reminders: ReminderDefaults) -> Self {
        self.reminders = Some(reminders);
        self
    }

    pub fn meetings_imported(&self) -> u64 {
        self.imported.load(Ordering::Relaxed)
    }

    pub fn meetings_updated(&self) -> u64 {
        self.updated.load(Ordering::Relaxed)
    }

    /// One sync pass at `now`. A user whose fetch fails is skipped.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<SyncReport> {
        let users = self.store.users_with_calendar()?;
        let mut report = SyncReport {
            users: users.len(),
            ..Default::default()
        };

        for user in &users {
            match self.sync_user(user, now).await {
                Ok((imported, updated)) => {
                    report.imported += imported;
                    report.updated += updated;
                }
                Err(e) => {
                    report.failed_users += 1;
                    warn!("Calendar sync failed for user {}: {:#}", user.id, e);
                }
            }
        }

        if report.imported + report.updated + report.failed_users > 0 {
            info!(
                "Calendar sync: {} users, {} imported, {} updated, {} failed",
                report.users, report.imported, report.updated, report.failed_users
            );
        } else {
            debug!("Calendar sync: {} users, no changes", report.users);
        }
        Ok(report)
    }

    async fn sync_user(&self, user: &User, now: DateTime<Utc>) -> Result<(usize, usize)> {
        let Some(credential) = user.calendar_credential() else {
            return Ok((0, 0));
        };

        let events = self
            .calendar
            .get_events(&credential, now, now + self.window)
            .await?;
        debug!("Fetched {} events for user {}", events.len(), user.id);

        let (mut imported, mut updated) = (0, 0);
        for event in &events {
            match self.sync_event(user, event, now) {
                Ok(EventSync::Imported) => imported += 1,
                Ok(EventSync::Updated) => updated += 1,
                Ok(EventSync::Unchanged) => {}
                Err(e) => warn!("Skipping event {} for user {}: {:#}", event.id, user.id, e),
            }
        }
        Ok((imported, updated))
    }

    fn sync_event(&self, user: &User, event: &CalendarEvent, now: DateTime<Utc>) -> Result<EventSync> {
        match self.store.meeting_by_event(&user.id, &event.id)? {
            Some(existing) => {
                let patch = diff(&existing, event);
                if patch.is_empty() {
                    return Ok(EventSync::Unchanged);
                }
                self.store.update_meeting(&existing.id, &patch)?;
                self.updated.fetch_add(1, Ordering::Relaxed);
                debug!("Updated meeting {} from event {}", existing.id, event.id);
                Ok(EventSync::Updated)
            }
            None if event.is_cancelled() => Ok(EventSync::Unchanged),
            None => {
                let meeting = self.store.create_meeting(&new_meeting(user, event))?;
                self.imported.fetch_add(1, Ordering::Relaxed);
                debug!("Imported '{}' as meeting {}", meeting.title, meeting.id);

                if let Some(defaults) = &self.reminders {
                    let scheduled = defaults.service.schedule_reminders(
                        &meeting,
                        &defaults.minutes_before,
                        &defaults.channels,
                        now,
                    );
                    if let Err(e) = scheduled {
                        warn!("No reminders for imported meeting {}: {:#}", meeting.id, e);
                    }
                }
                Ok(EventSync::Imported)
            }
        }
    }
}

enum EventSync {
    Imported,
    Updated,
    Unchanged,
}

fn event_title(event: &CalendarEvent) -> String {
    event
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string()
}

fn new_meeting(user: &User, event: &CalendarEvent) -> NewMeeting {
    NewMeeting {
        user_id: user.id.clone(),
        event_id: Some(event.id.clone()),
        title: event_title(event),
        description: event.description.clone(),
        start_time: event.start.to_utc(),
        end_time: event.end.to_utc(),
        attendees: event.attendees.clone(),
        meeting_link: event.meeting_link(),
        meeting_platform: event.platform().to_string(),
        is_confirmed: true,
    }
}

/// Fields that changed upstream. Timestamps compare at second precision,
/// which is what the store keeps.
fn diff(existing: &Meeting, event: &CalendarEvent) -> MeetingPatch {
    let title = event_title(event);
    let start = event.start.to_utc();
    let end = event.end.to_utc();

    MeetingPatch {
        title: (existing.title != title).then_some(title),
        start_time: (existing.start_time.timestamp() != start.timestamp()).then_some(start),
        end_time: (existing.end_time.timestamp() != end.timestamp()).then_some(end),
        is_cancelled: (event.is_cancelled() && !existing.is_cancelled).then_some(true),
    }
}

#[async_trait]
impl Agent for MonitorAgent {
    fn name(&self) -> &str {
        "monitor"
    }

    async fn tick(&self) -> Result<()> {
        self.run_at(Utc::now()).await.map(|_| ())
    }

    fn counters(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("meetings_imported", self.imported.load(Ordering::Relaxed)),
            ("meetings_updated", self.updated.load(Ordering::Relaxed)),
        ]
    }
}
