//! Reminder text rendering

use crate::models::{Context, Meeting, NotificationChannel};

const MAX_LISTED_ATTENDEES: usize = 5;
const MAX_LISTED_ITEMS: usize = 3;

/// Channel-ready reminder payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
    /// Join link, sent as a button where the channel supports it
    pub link: Option<String>,
}

/// Render a reminder for `channel`. Telegram bodies are MarkdownV2-escaped.
pub fn render_reminder(
    channel: NotificationChannel,
    meeting: &Meeting,
    context: Option<&Context>,
    minutes_until: i64,
) -> RenderedMessage {
    let subject = if minutes_until <= 0 {
        format!("Meeting Created: {}", meeting.title)
    } else {
        format!("Reminder: {} in {} minutes", meeting.title, minutes_until)
    };

    let mut lines = vec![subject.clone(), String::new()];
    lines.push(format!("Time: {}", meeting.start_time.format("%Y-%m-%d %H:%M UTC")));
    lines.push(format!("Duration: {} minutes", meeting.duration_minutes()));

    if let Some(desc) = meeting.description.as_deref().filter(|d| !d.trim().is_empty()) {
        lines.push(format!("Description: {}", desc));
    }

    let emails = meeting.attendee_emails();
    if !emails.is_empty() {
        let mut listed = emails
            .iter()
            .take(MAX_LISTED_ATTENDEES)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if emails.len() > MAX_LISTED_ATTENDEES {
            listed.push_str(&format!(" +{} more", emails.len() - MAX_LISTED_ATTENDEES));
        }
        lines.push(format!("Attendees: {}", listed));
    }

    if let Some(ctx) = context.filter(|c| !c.ai_brief.is_empty()) {
        lines.push(String::new());
        lines.push("Brief:".to_string());
        lines.push(ctx.ai_brief.clone());

        if !ctx.key_topics.is_empty() {
            lines.push(String::new());
            lines.push("Key topics:".to_string());
            for topic in ctx.key_topics.iter().take(MAX_LISTED_ITEMS) {
                lines.push(format!("  - {}", topic));
            }
        }

        let open: Vec<_> = ctx.preparation_checklist.iter().filter(|i| !i.done).collect();
        if !open.is_empty() {
            lines.push(String::new());
            lines.push("Prepare:".to_string());
            for item in open.into_iter().take(MAX_LISTED_ITEMS) {
                lines.push(format!("  - {}", item.task));
            }
        }
    }

    if let Some(link) = &meeting.meeting_link {
        lines.push(String::new());
        lines.push(format!("Join: {}", link));
    }

    let body = lines.join("\n");
    let body = match channel {
        NotificationChannel::Telegram => teloxide::utils::markdown::escape(&body),
        _ => body,
    };

    RenderedMessage {
        subject,
        body,
        link: meeting.meeting_link.clone(),
    }
}
