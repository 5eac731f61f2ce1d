//! Domain records shared by the store, the agents and the delivery path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Meeting attendee (ordered as received)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Attendee {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            name: None,
        }
    }
}

/// A calendar meeting owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub user_id: String,
    /// External calendar event id, if imported
    pub event_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    /// Half-open window `[start_time, end_time)`
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub attendees: Vec<Attendee>,
    pub meeting_link: Option<String>,
    pub meeting_platform: String,
    pub is_confirmed: bool,
    pub is_cancelled: bool,
    pub context_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Meeting {
    /// Whole minutes from `now` until the meeting starts (truncated toward zero)
    pub fn minutes_until(&self, now: DateTime<Utc>) -> i64 {
        (self.start_time - now).num_minutes()
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    pub fn attendee_emails(&self) -> Vec<String> {
        self.attendees
            .iter()
            .map(|a| a.email.clone())
            .filter(|e| !e.is_empty())
            .collect()
    }
}

/// Fields for inserting a meeting
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub user_id: String,
    pub event_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub attendees: Vec<Attendee>,
    pub meeting_link: Option<String>,
    pub meeting_platform: String,
    pub is_confirmed: bool,
}

impl NewMeeting {
    pub fn new(user_id: &str, title: &str, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            event_id: None,
            title: title.to_string(),
            description: None,
            start_time,
            end_time,
            attendees: vec![],
            meeting_link: None,
            meeting_platform: "other".to_string(),
            is_confirmed: true,
        }
    }

    pub fn with_attendees(mut self, emails: &[&str]) -> Self {
        self.attendees = emails.iter().map(|e| Attendee::new(e)).collect();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }
}

/// Partial update; `None` leaves a column untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeetingPatch {
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_cancelled: Option<bool>,
}

impl MeetingPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.is_cancelled.is_none()
    }
}

/// One preparation step in a brief
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub task: String,
    #[serde(default)]
    pub done: bool,
}

impl ChecklistItem {
    pub fn new(task: &str) -> Self {
        Self {
            task: task.to_string(),
            done: false,
        }
    }
}

/// AI-generated preparation brief for a meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    pub user_id: String,
    pub meeting_id: String,
    pub ai_brief: String,
    pub meeting_type: String,
    pub key_topics: Vec<String>,
    pub preparation_checklist: Vec<ChecklistItem>,
    /// attendee email -> likely role
    pub attendee_context: HashMap<String, String>,
    /// 0-100
    pub confidence_score: u8,
    pub user_edited: bool,
    pub ai_model_version: String,
    pub generated_at: DateTime<Utc>,
}

/// Fields for inserting a context
#[derive(Debug, Clone)]
pub struct NewContext {
    pub user_id: String,
    pub meeting_id: String,
    pub ai_brief: String,
    pub meeting_type: String,
    pub key_topics: Vec<String>,
    pub preparation_checklist: Vec<ChecklistItem>,
    pub attendee_context: HashMap<String, String>,
    pub confidence_score: u8,
    pub ai_model_version: String,
}

/// Delivery channel for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Telegram,
    Sms,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Telegram => "telegram",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "telegram" => Ok(Self::Telegram),
            "sms" => Ok(Self::Sms),
            other => anyhow::bail!("unknown notification channel '{}'", other),
        }
    }
}

/// Notification lifecycle
///
/// ```text
/// scheduled ──► sent ──► delivered
///     │
///     ├──────► failed ──(resend)──► sent | failed
///     └──────► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Scheduled,
    Sent,
    Delivered,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => anyhow::bail!("unknown notification status '{}'", other),
        }
    }
}

/// A reminder scheduled for one user over one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub meeting_id: String,
    pub user_id: String,
    pub channel: NotificationChannel,
    /// Fixed at creation
    pub scheduled_time: DateTime<Utc>,
    pub status: NotificationStatus,
    pub sent_time: Option<DateTime<Utc>>,
    pub delivered_time: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub error_message: Option<String>,
}

/// Fields for inserting a user
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub google_token: Option<String>,
    pub google_refresh_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
}

impl NewUser {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_calendar(mut self, access_token: &str, refresh_token: &str) -> Self {
        self.google_token = Some(access_token.to_string());
        self.google_refresh_token = Some(refresh_token.to_string());
        self
    }

    pub fn with_telegram(mut self, chat_id: i64) -> Self {
        self.telegram_chat_id = Some(chat_id);
        self
    }
}

/// OAuth credential pair for an external calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarCredential {
    pub access_token: Option<String>,
    pub refresh_token: String,
}

/// Account holder
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub google_token: Option<String>,
    pub google_refresh_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn calendar_credential(&self) -> Option<CalendarCredential> {
        self.google_refresh_token.as_ref().map(|refresh| CalendarCredential {
            access_token: self.google_token.clone(),
            refresh_token: refresh.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn meeting_at(start: DateTime<Utc>) -> Meeting {
        Meeting {
            id: "m1".into(),
            user_id: "u1".into(),
            event_id: None,
            title: "Sync".into(),
            description: None,
            start_time: start,
            end_time: start + Duration::minutes(45),
            attendees: vec![Attendee::new("a@example.com"), Attendee::new("")],
            meeting_link: None,
            meeting_platform: "other".into(),
            is_confirmed: true,
            is_cancelled: false,
            context_generated: false,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_minutes_until_truncates() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let meeting = meeting_at(now + Duration::seconds(30 * 60 + 59));
        assert_eq!(meeting.minutes_until(now), 30);
        assert_eq!(meeting.duration_minutes(), 45);
    }

    #[test]
    fn test_attendee_emails_skip_blank() {
        let meeting = meeting_at(Utc::now());
        assert_eq!(meeting.attendee_emails(), vec!["a@example.com".to_string()]);
    }

    #[test]
    fn test_channel_round_trip_names() {
        assert_eq!("Telegram".parse::<NotificationChannel>().unwrap(), NotificationChannel::Telegram);
        assert!("pigeon".parse::<NotificationChannel>().is_err());
        assert_eq!(NotificationStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_calendar_credential_requires_refresh_token() {
        let mut user = User {
            id: "u1".into(),
            email: "owner@example.com".into(),
            name: "Owner".into(),
            google_token: Some("access".into()),
            google_refresh_token: None,
            telegram_chat_id: None,
            deleted_at: None,
        };
        assert!(user.calendar_credential().is_none());

        user.google_refresh_token = Some("refresh".into());
        let cred = user.calendar_credential().unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("access"));
        assert_eq!(cred.refresh_token, "refresh");
    }

    #[test]
    fn test_empty_patch() {
        assert!(MeetingPatch::default().is_empty());
        let patch = MeetingPatch {
            is_cancelled: Some(true),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
