//! Channel routing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{render_reminder, Deliver, DeliveryError, RenderedMessage};
use crate::models::{Context, Meeting, NotificationChannel};

/// One outbound channel (email relay, Telegram bot, ...)
#[async_trait]
pub trait Transport: Send + Sync {
    fn channel(&self) -> NotificationChannel;

    async fn send(&self, address: &str, message: &RenderedMessage) -> Result<(), DeliveryError>;
}

/// Routes each delivery to the transport registered for its channel
#[derive(Default, Clone)]
pub struct ChannelRouter {
    transports: HashMap<NotificationChannel, Arc<dyn Transport>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport; replaces any previous one for the same channel
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(transport.channel(), transport);
        self
    }

    pub fn has_channel(&self, channel: NotificationChannel) -> bool {
        self.transports.contains_key(&channel)
    }
}

#[async_trait]
impl Deliver for ChannelRouter {
    async fn deliver(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        meeting: &Meeting,
        context: Option<&Context>,
        minutes_until: i64,
    ) -> Result<(), DeliveryError> {
        if channel == NotificationChannel::Sms {
            return Err(DeliveryError::Unsupported(channel));
        }
        let transport = self
            .transports
            .get(&channel)
            .ok_or(DeliveryError::NotConfigured(channel))?;

        let message = render_reminder(channel, meeting, context, minutes_until);
        transport.send(recipient, &message).await?;

        debug!("Delivered '{}' via {} to {}", message.subject, channel, recipient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attendee;
    use chrono::{Duration, Utc};
    use parking_lot::Mutex;

    struct Capture {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Transport for Capture {
        fn channel(&self) -> NotificationChannel {
            NotificationChannel::Email
        }

        async fn send(&self, address: &str, message: &RenderedMessage) -> Result<(), DeliveryError> {
            self.sent.lock().push((address.to_string(), message.subject.clone()));
            Ok(())
        }
    }

    fn meeting() -> Meeting {
        let start = Utc::now() + Duration::hours(1);
        Meeting {
            id: "m".into(),
            user_id: "u".into(),
            event_id: None,
            title: "Sync".into(),
            description: None,
            start_time: start,
            end_time: start + Duration::minutes(30),
            attendees: vec![Attendee::new("a@example.com")],
            meeting_link: None,
            meeting_platform: "other".into(),
            is_confirmed: true,
            is_cancelled: false,
            context_generated: false,
            created_at: start,
            updated_at: start,
        }
    }

    #[tokio::test]
    async fn test_routes_to_registered_transport() {
        let capture = Arc::new(Capture { sent: Mutex::new(vec![]) });
        let router = ChannelRouter::new().with_transport(capture.clone());

        router
            .deliver(NotificationChannel::Email, "owner@example.com", &meeting(), None, 30)
            .await
            .unwrap();

        let sent = capture.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "owner@example.com");
        assert_eq!(sent[0].1, "Reminder: Sync in 30 minutes");
    }

    #[tokio::test]
    async fn test_unconfigured_and_unsupported_channels() {
        let router = ChannelRouter::new();
        assert!(!router.has_channel(NotificationChannel::Telegram));

        let err = router
            .deliver(NotificationChannel::Telegram, "42", &meeting(), None, 30)
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryError::NotConfigured(NotificationChannel::Telegram));

        let err = router
            .deliver(NotificationChannel::Sms, "+100", &meeting(), None, 30)
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryError::Unsupported(NotificationChannel::Sms));
    }
}
