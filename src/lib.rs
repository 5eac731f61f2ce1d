//! BriefBot Agents
//!
//! Autonomous background workers for a meeting assistant.
//!
//! # Features
//!
//! - **Reminders**: dispatches due notifications every minute, with an
//!   attendee broadcast close to the meeting
//! - **Briefs**: generates AI preparation context for upcoming meetings
//! - **Calendar Sync**: mirrors external calendars into the meeting store
//! - **Orchestration**: starts, stops and reports on all agents as a group
//!
//! # Architecture
//!
//! ```text
//! AgentOrchestrator ──► AgentRunner (interval loop)
//!                         │
//!                         ├── NotificationAgent ──► NotificationService ──► ChannelRouter
//!                         │                                                   ├── Email (HTTP relay)
//!                         │                                                   └── Telegram
//!                         ├── ContextAgent ──► ContextGenerator (Ollama)
//!                         └── MonitorAgent ──► CalendarProvider (Google)
//!
//! Store (SQLite): users, meetings, contexts, notifications
//! ```

pub mod agents;
pub mod config;
pub mod delivery;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod status;
pub mod store;

pub use agents::{Agent, AgentRunner, AgentStatus, ContextAgent, MonitorAgent, NotificationAgent};
pub use config::Config;
pub use delivery::{BroadcastPolicy, ChannelRouter, Deliver, DeliveryError, NotificationService};
pub use models::{Context, Meeting, Notification, NotificationChannel, NotificationStatus, User};
pub use orchestrator::{AgentOrchestrator, OrchestratorStatus};
pub use store::Store;
