//! Shared fakes for agent integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use briefbot::delivery::{Deliver, DeliveryError};
use briefbot::models::{CalendarCredential, ChecklistItem, Context, Meeting, NotificationChannel};
use briefbot::services::{
    CalendarError, CalendarEvent, CalendarProvider, ContextGenerator, GeneratedContext, GenerationError,
    MeetingBriefRequest,
};
use briefbot::Store;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub fn create_test_store(name: &str) -> (Store, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join(format!("{}.db", name));
    let store = Store::open(&db_path).expect("Failed to create store");
    (store, temp_dir)
}

/// Current time at whole-second precision, as the store persists it
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub meeting_id: String,
    pub minutes_until: i64,
    pub had_context: bool,
}

/// Records every delivery; fails for listed recipients
#[derive(Default)]
pub struct RecordingDelivery {
    pub deliveries: Mutex<Vec<Delivery>>,
    pub fail_for: Mutex<Vec<String>>,
}

impl RecordingDelivery {
    pub fn failing_for(recipient: &str) -> Self {
        let fake = Self::default();
        fake.fail_for.lock().push(recipient.to_string());
        fake
    }

    pub fn recipients(&self) -> Vec<String> {
        self.deliveries.lock().iter().map(|d| d.recipient.clone()).collect()
    }
}

#[async_trait]
impl Deliver for RecordingDelivery {
    async fn deliver(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        meeting: &Meeting,
        context: Option<&Context>,
        minutes_until: i64,
    ) -> Result<(), DeliveryError> {
        self.deliveries.lock().push(Delivery {
            channel,
            recipient: recipient.to_string(),
            meeting_id: meeting.id.clone(),
            minutes_until,
            had_context: context.is_some(),
        });
        if self.fail_for.lock().iter().any(|r| r == recipient) {
            return Err(DeliveryError::Transport(format!("{} unreachable", recipient)));
        }
        Ok(())
    }
}

/// Canned brief generator that counts calls
#[derive(Default)]
pub struct StubGenerator {
    pub calls: AtomicUsize,
    pub titles: Mutex<Vec<String>>,
    pub fail_titles: Mutex<Vec<String>>,
}

impl StubGenerator {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextGenerator for StubGenerator {
    async fn generate_context(&self, request: &MeetingBriefRequest) -> Result<GeneratedContext, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.titles.lock().push(request.title.clone());
        if self.fail_titles.lock().contains(&request.title) {
            return Err(GenerationError::ServiceUnavailable("model offline".into()));
        }
        Ok(GeneratedContext {
            brief: format!("Brief for {}", request.title),
            meeting_type: "planning".into(),
            key_topics: vec!["roadmap".into()],
            checklist: vec![ChecklistItem::new("Review agenda")],
            attendee_context: HashMap::new(),
            confidence: 85,
            model: "stub".into(),
        })
    }
}

/// Serves fixed events per refresh token
#[derive(Default)]
pub struct StubCalendar {
    pub events: Mutex<HashMap<String, Vec<CalendarEvent>>>,
    pub unauthorized: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl StubCalendar {
    pub fn set_events(&self, refresh_token: &str, events: Vec<CalendarEvent>) {
        self.events.lock().insert(refresh_token.to_string(), events);
    }
}

#[async_trait]
impl CalendarProvider for StubCalendar {
    async fn get_events(
        &self,
        credential: &CalendarCredential,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unauthorized.lock().contains(&credential.refresh_token) {
            return Err(CalendarError::Unauthorized);
        }
        Ok(self
            .events
            .lock()
            .get(&credential.refresh_token)
            .cloned()
            .unwrap_or_default())
    }
}
