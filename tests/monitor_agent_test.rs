//! MonitorAgent Integration Tests

mod common;

use briefbot::agents::ReminderDefaults;
use briefbot::delivery::{BroadcastPolicy, NotificationService};
use briefbot::models::{Attendee, NewUser, NotificationChannel};
use briefbot::services::{CalendarEvent, EventTime};
use briefbot::{MonitorAgent, Store};
use chrono::{DateTime, Duration, Utc};
use common::{now, RecordingDelivery, StubCalendar};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn event(id: &str, title: &str, start: DateTime<Utc>, minutes: i64) -> CalendarEvent {
    CalendarEvent {
        id: id.to_string(),
        title: Some(title.to_string()),
        description: None,
        start: EventTime::DateTime(start),
        end: EventTime::DateTime(start + Duration::minutes(minutes)),
        attendees: vec![Attendee::new("guest@example.com")],
        status: "confirmed".into(),
        video_link: Some("https://meet.google.com/abc-defg-hij".into()),
        location: None,
    }
}

fn setup() -> (Store, Arc<StubCalendar>, MonitorAgent) {
    let store = Store::open_in_memory().unwrap();
    let calendar = Arc::new(StubCalendar::default());
    let agent = MonitorAgent::new(store.clone(), calendar.clone(), 30);
    (store, calendar, agent)
}

#[tokio::test]
async fn test_import_then_refetch_is_stable() {
    let (store, calendar, agent) = setup();
    let t = now();
    let user = store
        .create_user(&NewUser::new("owner@example.com", "Owner").with_calendar("access", "refresh-1"))
        .unwrap();
    calendar.set_events(
        "refresh-1",
        vec![
            event("evt-1", "Design review", t + Duration::days(1), 60),
            event("evt-2", "", t + Duration::days(2), 30),
        ],
    );

    let report = agent.run_at(t).await.unwrap();
    assert_eq!(report.imported, 2);
    assert_eq!(report.updated, 0);

    let first = store.meeting_by_event(&user.id, "evt-1").unwrap().unwrap();
    assert_eq!(first.title, "Design review");
    assert_eq!(first.meeting_platform, "google_meet");
    assert_eq!(first.attendee_emails(), vec!["guest@example.com"]);
    assert!(first.is_confirmed);
    let untitled = store.meeting_by_event(&user.id, "evt-2").unwrap().unwrap();
    assert_eq!(untitled.title, "Untitled Meeting");

    // Same data again: no new rows, no writes
    let report = agent.run_at(t).await.unwrap();
    assert_eq!(report.imported, 0);
    assert_eq!(report.updated, 0);
    let again = store.meeting_by_event(&user.id, "evt-1").unwrap().unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.updated_at, first.updated_at);
    assert_eq!(agent.meetings_imported(), 2);
    assert_eq!(agent.meetings_updated(), 0);
}

#[tokio::test]
async fn test_changed_event_updates_in_place() {
    let (store, calendar, agent) = setup();
    let t = now();
    let user = store
        .create_user(&NewUser::new("owner@example.com", "Owner").with_calendar("access", "refresh-1"))
        .unwrap();
    calendar.set_events("refresh-1", vec![event("evt-1", "Design review", t + Duration::days(1), 60)]);
    agent.run_at(t).await.unwrap();
    let original = store.meeting_by_event(&user.id, "evt-1").unwrap().unwrap();

    let moved_start = t + Duration::days(1) + Duration::hours(2);
    calendar.set_events("refresh-1", vec![event("evt-1", "Design review v2", moved_start, 90)]);
    let report = agent.run_at(t).await.unwrap();
    assert_eq!(report.imported, 0);
    assert_eq!(report.updated, 1);

    let updated = store.meeting_by_event(&user.id, "evt-1").unwrap().unwrap();
    assert_eq!(updated.id, original.id);
    assert_eq!(updated.title, "Design review v2");
    assert_eq!(updated.start_time.timestamp(), moved_start.timestamp());
    assert_eq!(updated.duration_minutes(), 90);
}

#[tokio::test]
async fn test_cancellation_handling() {
    let (store, calendar, agent) = setup();
    let t = now();
    let user = store
        .create_user(&NewUser::new("owner@example.com", "Owner").with_calendar("access", "refresh-1"))
        .unwrap();
    calendar.set_events("refresh-1", vec![event("evt-1", "Retro", t + Duration::days(1), 60)]);
    agent.run_at(t).await.unwrap();

    let mut cancelled = event("evt-1", "Retro", t + Duration::days(1), 60);
    cancelled.status = "cancelled".into();
    let mut never_stored = event("evt-9", "Ghost", t + Duration::days(3), 30);
    never_stored.status = "cancelled".into();
    calendar.set_events("refresh-1", vec![cancelled.clone(), never_stored]);

    let report = agent.run_at(t).await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.imported, 0);
    assert!(store.meeting_by_event(&user.id, "evt-1").unwrap().unwrap().is_cancelled);
    assert!(store.meeting_by_event(&user.id, "evt-9").unwrap().is_none());

    // Already cancelled: nothing more to write
    calendar.set_events("refresh-1", vec![cancelled]);
    assert_eq!(agent.run_at(t).await.unwrap().updated, 0);
}

#[tokio::test]
async fn test_user_failures_are_isolated() {
    let (store, calendar, agent) = setup();
    let t = now();
    let expired = store
        .create_user(&NewUser::new("expired@example.com", "Expired").with_calendar("old", "refresh-x"))
        .unwrap();
    let healthy = store
        .create_user(&NewUser::new("healthy@example.com", "Healthy").with_calendar("ok", "refresh-ok"))
        .unwrap();
    let deleted = store
        .create_user(&NewUser::new("deleted@example.com", "Deleted").with_calendar("ok", "refresh-del"))
        .unwrap();
    store.create_user(&NewUser::new("nocal@example.com", "No calendar")).unwrap();
    store.soft_delete_user(&deleted.id, t).unwrap();

    calendar.unauthorized.lock().push("refresh-x".into());
    calendar.set_events("refresh-ok", vec![event("evt-1", "Standup", t + Duration::hours(20), 15)]);
    calendar.set_events("refresh-del", vec![event("evt-2", "Hidden", t + Duration::hours(20), 15)]);

    let report = agent.run_at(t).await.unwrap();
    assert_eq!(report.users, 2);
    assert_eq!(report.failed_users, 1);
    assert_eq!(report.imported, 1);
    assert_eq!(calendar.calls.load(Ordering::SeqCst), 2);

    assert!(store.meeting_by_event(&healthy.id, "evt-1").unwrap().is_some());
    assert!(store.meeting_by_event(&expired.id, "evt-1").unwrap().is_none());
    assert!(store.meeting_by_event(&deleted.id, "evt-2").unwrap().is_none());
}

#[tokio::test]
async fn test_bad_event_is_skipped() {
    let (store, calendar, agent) = setup();
    let t = now();
    let user = store
        .create_user(&NewUser::new("owner@example.com", "Owner").with_calendar("access", "refresh-1"))
        .unwrap();
    calendar.set_events(
        "refresh-1",
        vec![
            event("evt-bad", "Backwards", t + Duration::days(1), -30),
            event("evt-good", "Fine", t + Duration::days(1), 30),
        ],
    );

    let report = agent.run_at(t).await.unwrap();
    assert_eq!(report.imported, 1);
    assert!(store.meeting_by_event(&user.id, "evt-bad").unwrap().is_none());
    assert!(store.meeting_by_event(&user.id, "evt-good").unwrap().is_some());
}

#[tokio::test]
async fn test_imported_meetings_get_default_reminders() {
    let store = Store::open_in_memory().unwrap();
    let calendar = Arc::new(StubCalendar::default());
    let service = Arc::new(NotificationService::new(
        store.clone(),
        Arc::new(RecordingDelivery::default()),
        BroadcastPolicy::default(),
    ));
    let agent = MonitorAgent::new(store.clone(), calendar.clone(), 30).with_reminders(ReminderDefaults {
        service,
        minutes_before: vec![30],
        channels: vec![NotificationChannel::Email],
    });

    let t = now();
    let user = store
        .create_user(&NewUser::new("owner@example.com", "Owner").with_calendar("access", "refresh-1"))
        .unwrap();
    let start = t + Duration::days(1);
    calendar.set_events("refresh-1", vec![event("evt-1", "Planning", start, 60)]);

    agent.run_at(t).await.unwrap();
    agent.run_at(t).await.unwrap();

    let meeting = store.meeting_by_event(&user.id, "evt-1").unwrap().unwrap();
    let reminders = store.notifications_for_meeting(&meeting.id).unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].scheduled_time, meeting.start_time - Duration::minutes(30));
    assert_eq!(reminders[0].channel, NotificationChannel::Email);
}
