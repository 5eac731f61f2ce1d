//! Configuration management

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::NotificationChannel;

/// Process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path
    pub db_path: PathBuf,

    /// NotificationAgent cadence
    pub notification_interval: Duration,

    /// ContextAgent cadence
    pub context_interval: Duration,

    /// MonitorAgent cadence
    pub monitor_interval: Duration,

    /// Maximum meetings the ContextAgent handles per tick
    pub context_batch_size: usize,

    /// How far ahead the ContextAgent looks for meetings
    pub context_lookahead_days: i64,

    /// How far ahead the MonitorAgent fetches calendar events
    pub calendar_sync_days: i64,

    /// Upper bound (minutes before start) of the attendee broadcast window
    pub broadcast_window_minutes: i64,

    /// How long `stop()` waits for an in-flight tick
    pub agent_stop_timeout: Duration,

    /// Ollama base URL for context generation
    pub ollama_url: String,

    /// Model used for context generation
    pub context_model: String,

    /// Timeout for a single generation call
    pub ai_timeout: Duration,

    /// Telegram bot token (optional - disables Telegram delivery when absent)
    pub telegram_bot_token: Option<String>,

    /// HTTP mail relay endpoint (optional - disables email delivery when absent)
    pub email_relay_url: Option<String>,

    /// Bearer key for the mail relay
    pub email_relay_api_key: Option<String>,

    /// From address used in outgoing mail
    pub email_sender: String,

    /// Google Calendar REST base URL
    pub google_calendar_api: String,

    /// Port for the status surface (optional)
    pub status_port: Option<u16>,

    /// Offsets (minutes before start) used when scheduling reminders
    pub default_reminder_minutes: Vec<i64>,

    /// Channels used when scheduling reminders
    pub default_channels: Vec<NotificationChannel>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            notification_interval: Duration::from_secs(60),
            context_interval: Duration::from_secs(300),
            monitor_interval: Duration::from_secs(600),
            context_batch_size: 5,
            context_lookahead_days: 7,
            calendar_sync_days: 30,
            broadcast_window_minutes: 35,
            agent_stop_timeout: Duration::from_secs(30),
            ollama_url: "http://localhost:11434".to_string(),
            context_model: "mistral:latest".to_string(),
            ai_timeout: Duration::from_secs(60),
            telegram_bot_token: None,
            email_relay_url: None,
            email_relay_api_key: None,
            email_sender: "briefbot@localhost".to_string(),
            google_calendar_api: "https://www.googleapis.com/calendar/v3".to_string(),
            status_port: None,
            default_reminder_minutes: vec![30],
            default_channels: vec![NotificationChannel::Email],
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let secs = |key: &str, fallback: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(v) => {
                    let n: u64 = v
                        .trim()
                        .parse()
                        .with_context(|| format!("{} must be a whole number of seconds", key))?;
                    Ok(Duration::from_secs(n.max(1)))
                }
                None => Ok(fallback),
            }
        };

        let number = |key: &str, fallback: i64| -> Result<i64> {
            match lookup(key) {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be an integer", key)),
                None => Ok(fallback),
            }
        };

        let db_path = lookup("BRIEFBOT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let context_batch_size = number("CONTEXT_BATCH_SIZE", defaults.context_batch_size as i64)?;

        let status_port = match lookup("STATUS_PORT") {
            Some(v) => Some(v.trim().parse().context("STATUS_PORT must be a port number")?),
            None => None,
        };

        let default_reminder_minutes = match lookup("DEFAULT_REMINDER_MINUTES") {
            Some(v) => parse_minutes(&v)?,
            None => defaults.default_reminder_minutes,
        };

        let default_channels = match lookup("DEFAULT_CHANNELS") {
            Some(v) => parse_channels(&v)?,
            None => defaults.default_channels,
        };

        Ok(Self {
            db_path,
            notification_interval: secs("NOTIFICATION_INTERVAL_SECS", defaults.notification_interval)?,
            context_interval: secs("CONTEXT_INTERVAL_SECS", defaults.context_interval)?,
            monitor_interval: secs("MONITOR_INTERVAL_SECS", defaults.monitor_interval)?,
            context_batch_size: context_batch_size.max(1) as usize,
            context_lookahead_days: number("CONTEXT_LOOKAHEAD_DAYS", defaults.context_lookahead_days)?,
            calendar_sync_days: number("CALENDAR_SYNC_DAYS", defaults.calendar_sync_days)?,
            broadcast_window_minutes: number("BROADCAST_WINDOW_MINUTES", defaults.broadcast_window_minutes)?,
            agent_stop_timeout: secs("AGENT_STOP_TIMEOUT_SECS", defaults.agent_stop_timeout)?,
            ollama_url: lookup("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            context_model: lookup("CONTEXT_MODEL").unwrap_or(defaults.context_model),
            ai_timeout: secs("AI_TIMEOUT_SECS", defaults.ai_timeout)?,
            telegram_bot_token: lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.is_empty()),
            email_relay_url: lookup("EMAIL_RELAY_URL").filter(|u| !u.is_empty()),
            email_relay_api_key: lookup("EMAIL_RELAY_API_KEY").filter(|k| !k.is_empty()),
            email_sender: lookup("EMAIL_SENDER").unwrap_or(defaults.email_sender),
            google_calendar_api: lookup("GOOGLE_CALENDAR_API").unwrap_or(defaults.google_calendar_api),
            status_port,
            default_reminder_minutes,
            default_channels,
        })
    }
}

fn parse_minutes(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("invalid reminder offset '{}'", s))
        })
        .collect()
}

fn parse_channels(raw: &str) -> Result<Vec<NotificationChannel>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<NotificationChannel>())
        .collect()
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("briefbot")
        .join("briefbot.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_agent_cadences() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.notification_interval, Duration::from_secs(60));
        assert_eq!(config.context_interval, Duration::from_secs(300));
        assert_eq!(config.monitor_interval, Duration::from_secs(600));
        assert_eq!(config.context_batch_size, 5);
        assert_eq!(config.broadcast_window_minutes, 35);
        assert!(config.telegram_bot_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("CONTEXT_BATCH_SIZE", "3"),
            ("BROADCAST_WINDOW_MINUTES", "20"),
            ("NOTIFICATION_INTERVAL_SECS", "15"),
            ("DEFAULT_REMINDER_MINUTES", "60, 15"),
            ("DEFAULT_CHANNELS", "email,telegram"),
            ("STATUS_PORT", "8088"),
        ]))
        .unwrap();

        assert_eq!(config.context_batch_size, 3);
        assert_eq!(config.broadcast_window_minutes, 20);
        assert_eq!(config.notification_interval, Duration::from_secs(15));
        assert_eq!(config.default_reminder_minutes, vec![60, 15]);
        assert_eq!(
            config.default_channels,
            vec![NotificationChannel::Email, NotificationChannel::Telegram]
        );
        assert_eq!(config.status_port, Some(8088));
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("CONTEXT_BATCH_SIZE", "many")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_token_is_ignored() {
        let config = Config::from_lookup(lookup_from(&[("TELEGRAM_BOT_TOKEN", "")])).unwrap();
        assert!(config.telegram_bot_token.is_none());
    }
}
