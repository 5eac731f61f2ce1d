//! Telegram transport

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};

use super::{DeliveryError, RenderedMessage, Transport};
use crate::models::NotificationChannel;

/// Sends reminders through the Bot API; the recipient address is the chat id
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(token: &str) -> Self {
        Self { bot: Bot::new(token) }
    }
}

fn parse_chat_id(address: &str) -> Result<ChatId, DeliveryError> {
    address
        .trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| DeliveryError::MissingRecipient(format!("invalid chat id '{}'", address)))
}

fn join_button(link: &str) -> Option<InlineKeyboardMarkup> {
    let url = reqwest::Url::parse(link).ok()?;
    Some(InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(
        "Join meeting",
        url,
    )]]))
}

#[async_trait]
impl Transport for TelegramTransport {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Telegram
    }

    async fn send(&self, address: &str, message: &RenderedMessage) -> Result<(), DeliveryError> {
        let chat_id = parse_chat_id(address)?;

        let mut request = self
            .bot
            .send_message(chat_id, message.body.clone())
            .parse_mode(ParseMode::MarkdownV2);
        if let Some(markup) = message.link.as_deref().and_then(join_button) {
            request = request.reply_markup(markup);
        }

        request
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(())
    }
}
