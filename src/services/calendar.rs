//! Calendar Fetch
//!
//! Reads upcoming events from a user's external calendar. Token refresh is
//! handled elsewhere; an expired access token surfaces as `Unauthorized`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{Attendee, CalendarCredential};

static MEETING_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https://(?:[\w-]+\.)?(?:zoom\.us/j|meet\.google\.com|teams\.microsoft\.com/l/meetup-join)/[^\s<>)]+")
        .expect("meeting link pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Calendar credential rejected")]
    Unauthorized,

    #[error("Calendar request failed: {0}")]
    Http(String),

    #[error("Calendar event could not be read: {0}")]
    Parse(String),
}

/// Start or end of an event: a timed instant or an all-day date
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTime {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

impl EventTime {
    /// Normalize to UTC; all-day dates map to midnight UTC
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::Date(d) => d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        }
    }
}

/// External calendar event, already normalized
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub attendees: Vec<Attendee>,
    /// `confirmed`, `tentative` or `cancelled`
    pub status: String,
    /// Conferencing link from the provider, if any
    pub video_link: Option<String>,
    pub location: Option<String>,
}

impl CalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.eq_ignore_ascii_case("cancelled")
    }

    /// Conferencing link, then a link found in the description
    pub fn conference_link(&self) -> Option<String> {
        self.video_link.clone().or_else(|| {
            self.description
                .as_deref()
                .and_then(|d| MEETING_LINK.find(d))
                .map(|m| m.as_str().to_string())
        })
    }

    /// Where to join: conferencing link, else the location
    pub fn meeting_link(&self) -> Option<String> {
        self.conference_link()
            .or_else(|| self.location.clone().filter(|l| !l.trim().is_empty()))
    }

    /// Platform inferred from the conferencing link
    pub fn platform(&self) -> &'static str {
        match self.conference_link() {
            Some(link) if link.contains("meet.google.com") => "google_meet",
            Some(link) if link.contains("zoom.us") => "zoom",
            Some(link) if link.contains("teams.microsoft.com") => "teams",
            Some(_) => "video",
            None => "other",
        }
    }
}

/// Opaque calendar collaborator
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn get_events(
        &self,
        credential: &CalendarCredential,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;
}

// Google Calendar v3 wire types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    // Decoded one by one so a single unreadable event doesn't lose the page
    #[serde(default)]
    items: Vec<serde_json::Value>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    status: Option<String>,
    start: Option<GoogleTime>,
    end: Option<GoogleTime>,
    #[serde(default)]
    attendees: Vec<GoogleAttendee>,
    hangout_link: Option<String>,
    conference_data: Option<ConferenceData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTime {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAttendee {
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConferenceData {
    #[serde(default)]
    entry_points: Vec<EntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryPoint {
    entry_point_type: Option<String>,
    uri: Option<String>,
}

fn parse_time(time: Option<GoogleTime>, field: &str, event_id: &str) -> Result<EventTime, CalendarError> {
    let time = time.ok_or_else(|| CalendarError::Parse(format!("event {} has no {}", event_id, field)))?;

    if let Some(raw) = time.date_time {
        return DateTime::parse_from_rfc3339(&raw)
            .map(|dt| EventTime::DateTime(dt.with_timezone(&Utc)))
            .map_err(|e| CalendarError::Parse(format!("event {} {} '{}': {}", event_id, field, raw, e)));
    }
    if let Some(raw) = time.date {
        return NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(EventTime::Date)
            .map_err(|e| CalendarError::Parse(format!("event {} {} '{}': {}", event_id, field, raw, e)));
    }
    Err(CalendarError::Parse(format!("event {} {} is empty", event_id, field)))
}

impl TryFrom<GoogleEvent> for CalendarEvent {
    type Error = CalendarError;

    fn try_from(event: GoogleEvent) -> Result<Self, Self::Error> {
        let start = parse_time(event.start, "start", &event.id)?;
        let end = parse_time(event.end, "end", &event.id)?;

        let video_link = event.hangout_link.or_else(|| {
            event.conference_data.and_then(|data| {
                data.entry_points
                    .into_iter()
                    .find(|ep| ep.entry_point_type.as_deref() == Some("video"))
                    .and_then(|ep| ep.uri)
            })
        });

        let attendees = event
            .attendees
            .into_iter()
            .filter_map(|a| {
                a.email.map(|email| Attendee {
                    email,
                    name: a.display_name,
                })
            })
            .collect();

        Ok(CalendarEvent {
            id: event.id,
            title: event.summary,
            description: event.description,
            start,
            end,
            attendees,
            status: event.status.unwrap_or_else(|| "confirmed".to_string()),
            video_link,
            location: event.location,
        })
    }
}

/// Google Calendar REST client
pub struct GoogleCalendarClient {
    base_url: String,
    client: reqwest::Client,
}

impl GoogleCalendarClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Decode one page of `events.list`, skipping events that can't be read
    fn parse_page(body: &str) -> Result<(Vec<CalendarEvent>, Option<String>), CalendarError> {
        let page: EventsPage =
            serde_json::from_str(body).map_err(|e| CalendarError::Parse(e.to_string()))?;
        let mut events = Vec::with_capacity(page.items.len());
        for item in page.items {
            let parsed = serde_json::from_value::<GoogleEvent>(item)
                .map_err(|e| CalendarError::Parse(e.to_string()))
                .and_then(CalendarEvent::try_from);
            match parsed {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping calendar event: {}", e),
            }
        }
        Ok((events, page.next_page_token))
    }

    /// `events.list` parameters; deleted events are included so cancellations are seen
    fn list_query(
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("timeMin", time_min.to_rfc3339()),
            ("timeMax", time_max.to_rfc3339()),
            ("singleEvents", "true".to_string()),
            ("showDeleted", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", "250".to_string()),
        ];
        if let Some(t) = page_token {
            query.push(("pageToken", t.to_string()));
        }
        query
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn get_events(
        &self,
        credential: &CalendarCredential,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let token = credential
            .access_token
            .as_deref()
            .ok_or(CalendarError::Unauthorized)?;

        let url = format!("{}/calendars/primary/events", self.base_url);
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let query = Self::list_query(time_min, time_max, page_token.as_deref());

            let response = self
                .client
                .get(&url)
                .bearer_auth(token)
                .query(&query)
                .send()
                .await
                .map_err(|e| CalendarError::Http(e.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return Err(CalendarError::Unauthorized);
            }
            if !status.is_success() {
                return Err(CalendarError::Http(format!("status {}", status)));
            }

            let body = response
                .text()
                .await
                .map_err(|e| CalendarError::Http(e.to_string()))?;
            let (events, next) = Self::parse_page(&body)?;
            all.extend(events);

            match next {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }

        debug!("Fetched {} calendar events", all.len());
        Ok(all)
    }
}
