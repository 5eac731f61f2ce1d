//! Notification Delivery
//!
//! Channel routing and delivery bookkeeping for meeting reminders:
//! - `Deliver`: the opaque "send this reminder to this address" seam
//! - `ChannelRouter`: picks the transport configured for a channel
//! - `NotificationService`: resolves recipients, applies the broadcast
//!   policy and records the outcome on the notification row

mod email;
mod render;
mod router;
mod service;
mod telegram;

use async_trait::async_trait;

use crate::models::{Context, Meeting, NotificationChannel};

pub use email::EmailTransport;
pub use render::{render_reminder, RenderedMessage};
pub use router::{ChannelRouter, Transport};
pub use service::{BroadcastPolicy, DispatchOutcome, NotificationError, NotificationService};
pub use telegram::TelegramTransport;

/// Error types for delivery
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("No recipient address: {0}")]
    MissingRecipient(String),

    #[error("Channel not supported: {0}")]
    Unsupported(NotificationChannel),

    #[error("Channel not configured: {0}")]
    NotConfigured(NotificationChannel),

    #[error("Transport failed: {0}")]
    Transport(String),
}

/// Delivers one rendered reminder to one address
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        meeting: &Meeting,
        context: Option<&Context>,
        minutes_until: i64,
    ) -> Result<(), DeliveryError>;
}
