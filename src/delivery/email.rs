//! Email transport over an HTTP mail relay

use async_trait::async_trait;
use std::time::Duration;

use super::{DeliveryError, RenderedMessage, Transport};
use crate::models::NotificationChannel;

/// Posts `{from, to, subject, text}` to a relay endpoint with bearer auth
pub struct EmailTransport {
    relay_url: String,
    api_key: Option<String>,
    sender: String,
    client: reqwest::Client,
}

impl EmailTransport {
    pub fn new(relay_url: &str, api_key: Option<String>, sender: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            relay_url: relay_url.to_string(),
            api_key,
            sender: sender.to_string(),
            client,
        }
    }

    fn payload(&self, address: &str, message: &RenderedMessage) -> serde_json::Value {
        serde_json::json!({
            "from": self.sender,
            "to": [address],
            "subject": message.subject,
            "text": message.body,
        })
    }
}

#[async_trait]
impl Transport for EmailTransport {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    async fn send(&self, address: &str, message: &RenderedMessage) -> Result<(), DeliveryError> {
        if address.trim().is_empty() {
            return Err(DeliveryError::MissingRecipient("empty email address".into()));
        }

        let mut request = self.client.post(&self.relay_url).json(&self.payload(address, message));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Transport(format!("relay error {}: {}", status, body)));
        }
        Ok(())
    }
}
