//! External collaborators
//!
//! Thin clients for the systems the agents depend on but do not own:
//! - Context generation (Ollama)
//! - Calendar fetch (Google Calendar REST)

pub mod ai;
pub mod calendar;

pub use ai::{ContextGenerator, GeneratedContext, GenerationError, MeetingBriefRequest, OllamaContextGenerator};
pub use calendar::{CalendarError, CalendarEvent, CalendarProvider, EventTime, GoogleCalendarClient};
