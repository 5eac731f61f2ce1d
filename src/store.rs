//! Meeting Store
//!
//! SQLite persistence for users, meetings, contexts and notifications.
//! Every public method runs in its own transaction: it commits when the
//! method returns `Ok` and rolls back when the transaction is dropped on `Err`.
//! Agents open no session across their sleep interval; the connection lock is
//! held only for the duration of a single call.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{
    Attendee, ChecklistItem, Context, Meeting, MeetingPatch, NewContext, NewMeeting, NewUser,
    Notification, NotificationChannel, User,
};

const MEETING_COLUMNS: &str = "id, user_id, event_id, title, description, start_time, end_time, \
     attendees, meeting_link, meeting_platform, is_confirmed, is_cancelled, context_generated, \
     created_at, updated_at";

const CONTEXT_COLUMNS: &str = "id, user_id, meeting_id, ai_brief, meeting_type, key_topics, \
     preparation_checklist, attendee_context, confidence_score, user_edited, ai_model_version, \
     generated_at";

const NOTIFICATION_COLUMNS: &str = "id, meeting_id, user_id, channel, scheduled_time, status, \
     sent_time, delivered_time, retry_count, error_message";

const USER_COLUMNS: &str =
    "id, email, name, google_token, google_refresh_token, telegram_chat_id, deleted_at";

/// Shared handle to the relational store
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        let store = Self::from_connection(conn)?;

        info!("Store opened: {}", path.display());
        Ok(store)
    }

    /// Private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL DEFAULT '',
                google_token TEXT,
                google_refresh_token TEXT,
                telegram_chat_id INTEGER,
                deleted_at INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meetings (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                event_id TEXT,
                title TEXT NOT NULL,
                description TEXT,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                attendees TEXT NOT NULL DEFAULT '[]',
                meeting_link TEXT,
                meeting_platform TEXT NOT NULL DEFAULT 'other',
                is_confirmed INTEGER NOT NULL DEFAULT 1,
                is_cancelled INTEGER NOT NULL DEFAULT 0,
                context_generated INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                CHECK (start_time < end_time)
            );

            CREATE INDEX IF NOT EXISTS idx_meetings_start ON meetings(start_time);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_meetings_event
                ON meetings(user_id, event_id) WHERE event_id IS NOT NULL;

            CREATE TABLE IF NOT EXISTS contexts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                meeting_id TEXT NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
                ai_brief TEXT NOT NULL DEFAULT '',
                meeting_type TEXT NOT NULL DEFAULT 'general',
                key_topics TEXT NOT NULL DEFAULT '[]',
                preparation_checklist TEXT NOT NULL DEFAULT '[]',
                attendee_context TEXT NOT NULL DEFAULT '{}',
                confidence_score INTEGER NOT NULL DEFAULT 0,
                user_edited INTEGER NOT NULL DEFAULT 0,
                ai_model_version TEXT NOT NULL DEFAULT '',
                generated_at INTEGER NOT NULL
            );

            -- one authoritative brief per meeting
            CREATE UNIQUE INDEX IF NOT EXISTS idx_contexts_meeting ON contexts(meeting_id);

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                meeting_id TEXT NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id),
                channel TEXT NOT NULL,
                scheduled_time INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'scheduled',
                sent_time INTEGER,
                delivered_time INTEGER,
                retry_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_notifications_due
                ON notifications(status, scheduled_time);
            "#,
        )?;
        Ok(())
    }

    // ---------------------------------------------------------------- users

    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO users (id, email, name, google_token, google_refresh_token,
                               telegram_chat_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                id,
                user.email,
                user.name,
                user.google_token,
                user.google_refresh_token,
                user.telegram_chat_id,
                Utc::now().timestamp()
            ],
        )
        .with_context(|| format!("Failed to create user {}", user.email))?;
        let created = query_user(&tx, &id)?.context("user vanished after insert")?;
        tx.commit()?;
        Ok(created)
    }

    /// Fetch a user, including soft-deleted ones
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        query_user(&conn, id)
    }

    pub fn soft_delete_user(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE users SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, at.timestamp()],
        )?;
        Ok(changed == 1)
    }

    /// Active users holding an external-calendar refresh credential
    pub fn users_with_calendar(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users \
             WHERE google_refresh_token IS NOT NULL AND deleted_at IS NULL \
             ORDER BY created_at, email",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    // ------------------------------------------------------------- meetings

    pub fn create_meeting(&self, meeting: &NewMeeting) -> Result<Meeting> {
        if meeting.start_time >= meeting.end_time {
            anyhow::bail!(
                "meeting '{}' must start before it ends ({} >= {})",
                meeting.title,
                meeting.start_time,
                meeting.end_time
            );
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let attendees = serde_json::to_string(&meeting.attendees)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO meetings (id, user_id, event_id, title, description, start_time,
                                  end_time, attendees, meeting_link, meeting_platform,
                                  is_confirmed, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            "#,
            params![
                id,
                meeting.user_id,
                meeting.event_id,
                meeting.title,
                meeting.description,
                meeting.start_time.timestamp(),
                meeting.end_time.timestamp(),
                attendees,
                meeting.meeting_link,
                meeting.meeting_platform,
                meeting.is_confirmed,
                now
            ],
        )
        .with_context(|| format!("Failed to create meeting '{}'", meeting.title))?;
        let created = query_meeting(&tx, &id)?.context("meeting vanished after insert")?;
        tx.commit()?;

        debug!("Created meeting {} ({})", created.id, created.title);
        Ok(created)
    }

    pub fn get_meeting(&self, id: &str) -> Result<Option<Meeting>> {
        let conn = self.conn.lock();
        query_meeting(&conn, id)
    }

    /// Look up a meeting by its external calendar event id
    pub fn meeting_by_event(&self, user_id: &str, event_id: &str) -> Result<Option<Meeting>> {
        let conn = self.conn.lock();
        let meeting = conn
            .query_row(
                &format!(
                    "SELECT {} FROM meetings WHERE user_id = ?1 AND event_id = ?2",
                    MEETING_COLUMNS
                ),
                params![user_id, event_id],
                row_to_meeting,
            )
            .optional()?;
        Ok(meeting)
    }

    /// Apply the set fields of `patch` in one write. An empty patch performs no write.
    pub fn update_meeting(&self, id: &str, patch: &MeetingPatch) -> Result<Meeting> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let current = query_meeting(&tx, id)?
            .with_context(|| format!("meeting {} not found", id))?;
        if patch.is_empty() {
            return Ok(current);
        }

        let start = patch.start_time.unwrap_or(current.start_time);
        let end = patch.end_time.unwrap_or(current.end_time);
        if start >= end {
            anyhow::bail!("meeting {} must start before it ends", id);
        }

        tx.execute(
            r#"
            UPDATE meetings SET
                title = COALESCE(?2, title),
                start_time = ?3,
                end_time = ?4,
                is_cancelled = COALESCE(?5, is_cancelled),
                updated_at = ?6
            WHERE id = ?1
            "#,
            params![
                id,
                patch.title,
                start.timestamp(),
                end.timestamp(),
                patch.is_cancelled,
                Utc::now().timestamp()
            ],
        )?;
        let updated = query_meeting(&tx, id)?.context("meeting vanished during update")?;
        tx.commit()?;
        Ok(updated)
    }

    /// Hard delete (API path); contexts and notifications cascade
    pub fn delete_meeting(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM meetings WHERE id = ?1", params![id])?;
        Ok(changed == 1)
    }

    /// Uncancelled meetings without a brief starting in `(after, until]`, soonest first
    pub fn meetings_needing_context(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Meeting>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM meetings \
             WHERE context_generated = 0 AND is_cancelled = 0 \
               AND start_time > ?1 AND start_time <= ?2 \
             ORDER BY start_time ASC, id ASC \
             LIMIT ?3",
            MEETING_COLUMNS
        ))?;
        let meetings = stmt
            .query_map(
                params![after.timestamp(), until.timestamp(), limit as i64],
                row_to_meeting,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(meetings)
    }

    // ------------------------------------------------------------- contexts

    /// Most recent brief for a meeting
    pub fn context_for_meeting(&self, meeting_id: &str) -> Result<Option<Context>> {
        let conn = self.conn.lock();
        let context = conn
            .query_row(
                &format!(
                    "SELECT {} FROM contexts WHERE meeting_id = ?1 \
                     ORDER BY generated_at DESC LIMIT 1",
                    CONTEXT_COLUMNS
                ),
                params![meeting_id],
                row_to_context,
            )
            .optional()?;
        Ok(context)
    }

    pub fn context_count(&self, meeting_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM contexts WHERE meeting_id = ?1",
            params![meeting_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Insert a brief unless the meeting already has one, and mark the meeting
    /// as covered, in a single transaction.
    ///
    /// Returns `true` when a new row was written, `false` when an existing brief won.
    pub fn insert_context_if_absent(&self, context: &NewContext) -> Result<bool> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            r#"
            INSERT INTO contexts (id, user_id, meeting_id, ai_brief, meeting_type, key_topics,
                                  preparation_checklist, attendee_context, confidence_score,
                                  ai_model_version, generated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(meeting_id) DO NOTHING
            "#,
            params![
                id,
                context.user_id,
                context.meeting_id,
                context.ai_brief,
                context.meeting_type,
                serde_json::to_string(&context.key_topics)?,
                serde_json::to_string(&context.preparation_checklist)?,
                serde_json::to_string(&context.attendee_context)?,
                context.confidence_score.min(100),
                context.ai_model_version,
                now
            ],
        )?;
        let flagged = tx.execute(
            "UPDATE meetings SET context_generated = 1, updated_at = ?2 WHERE id = ?1",
            params![context.meeting_id, now],
        )?;
        if flagged == 0 {
            anyhow::bail!("meeting {} not found", context.meeting_id);
        }
        tx.commit()?;
        Ok(inserted == 1)
    }

    /// Set `context_generated` when a brief already exists for the meeting
    pub fn mark_context_generated(&self, meeting_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            r#"
            UPDATE meetings SET context_generated = 1, updated_at = ?2
            WHERE id = ?1 AND context_generated = 0
              AND EXISTS (SELECT 1 FROM contexts WHERE meeting_id = ?1)
            "#,
            params![meeting_id, Utc::now().timestamp()],
        )?;
        Ok(changed == 1)
    }

    // -------------------------------------------------------- notifications

    pub fn create_notification(
        &self,
        meeting_id: &str,
        user_id: &str,
        channel: NotificationChannel,
        scheduled_time: DateTime<Utc>,
    ) -> Result<Notification> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO notifications (id, meeting_id, user_id, channel, scheduled_time,
                                       status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 'scheduled', ?6)
            "#,
            params![
                id,
                meeting_id,
                user_id,
                channel.as_str(),
                scheduled_time.timestamp(),
                Utc::now().timestamp()
            ],
        )
        .with_context(|| format!("Failed to schedule notification for meeting {}", meeting_id))?;
        let created = query_notification(&tx, &id)?.context("notification vanished after insert")?;
        tx.commit()?;
        Ok(created)
    }

    pub fn get_notification(&self, id: &str) -> Result<Option<Notification>> {
        let conn = self.conn.lock();
        query_notification(&conn, id)
    }

    pub fn notifications_for_meeting(&self, meeting_id: &str) -> Result<Vec<Notification>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications WHERE meeting_id = ?1 \
             ORDER BY scheduled_time ASC, id ASC",
            NOTIFICATION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![meeting_id], row_to_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Scheduled notifications whose time has come, oldest first
    pub fn due_notifications(&self, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications \
             WHERE status = 'scheduled' AND scheduled_time <= ?1 \
             ORDER BY scheduled_time ASC, id ASC",
            NOTIFICATION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![now.timestamp()], row_to_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `scheduled -> sent`; returns `false` if the row left `scheduled` in the meantime
    pub fn mark_notification_sent(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE notifications SET status = 'sent', sent_time = ?2, error_message = NULL \
             WHERE id = ?1 AND status = 'scheduled'",
            params![id, at.timestamp()],
        )?;
        Ok(changed == 1)
    }

    /// `scheduled -> failed`; returns `false` if the row left `scheduled` in the meantime
    pub fn mark_notification_failed(&self, id: &str, error: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE notifications SET status = 'failed', error_message = ?2 \
             WHERE id = ?1 AND status = 'scheduled'",
            params![id, error],
        )?;
        Ok(changed == 1)
    }

    /// `scheduled -> cancelled`; returns `false` if the notification was in any other state
    pub fn cancel_notification(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE notifications SET status = 'cancelled' WHERE id = ?1 AND status = 'scheduled'",
            params![id],
        )?;
        Ok(changed == 1)
    }

    /// `failed -> scheduled` for a resend, counting the attempt
    pub fn begin_retry(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE notifications SET status = 'scheduled', retry_count = retry_count + 1 \
             WHERE id = ?1 AND status = 'failed'",
            params![id],
        )?;
        Ok(changed == 1)
    }
}

// ------------------------------------------------------------------ helpers

fn from_ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn json_column<T: serde::de::DeserializeOwned + Default>(raw: String) -> T {
    serde_json::from_str(&raw).unwrap_or_default()
}

fn query_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

fn query_meeting(conn: &Connection, id: &str) -> Result<Option<Meeting>> {
    let meeting = conn
        .query_row(
            &format!("SELECT {} FROM meetings WHERE id = ?1", MEETING_COLUMNS),
            params![id],
            row_to_meeting,
        )
        .optional()?;
    Ok(meeting)
}

fn query_notification(conn: &Connection, id: &str) -> Result<Option<Notification>> {
    let notification = conn
        .query_row(
            &format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS),
            params![id],
            row_to_notification,
        )
        .optional()?;
    Ok(notification)
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        google_token: row.get(3)?,
        google_refresh_token: row.get(4)?,
        telegram_chat_id: row.get(5)?,
        deleted_at: row.get::<_, Option<i64>>(6)?.map(from_ts),
    })
}

fn row_to_meeting(row: &Row<'_>) -> rusqlite::Result<Meeting> {
    let attendees: Vec<Attendee> = json_column(row.get(7)?);
    Ok(Meeting {
        id: row.get(0)?,
        user_id: row.get(1)?,
        event_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        start_time: from_ts(row.get(5)?),
        end_time: from_ts(row.get(6)?),
        attendees,
        meeting_link: row.get(8)?,
        meeting_platform: row.get(9)?,
        is_confirmed: row.get(10)?,
        is_cancelled: row.get(11)?,
        context_generated: row.get(12)?,
        created_at: from_ts(row.get(13)?),
        updated_at: from_ts(row.get(14)?),
    })
}

fn row_to_context(row: &Row<'_>) -> rusqlite::Result<Context> {
    let checklist: Vec<ChecklistItem> = json_column(row.get(6)?);
    let score: i64 = row.get(8)?;
    Ok(Context {
        id: row.get(0)?,
        user_id: row.get(1)?,
        meeting_id: row.get(2)?,
        ai_brief: row.get(3)?,
        meeting_type: row.get(4)?,
        key_topics: json_column(row.get(5)?),
        preparation_checklist: checklist,
        attendee_context: json_column(row.get(7)?),
        confidence_score: score.clamp(0, 100) as u8,
        user_edited: row.get(9)?,
        ai_model_version: row.get(10)?,
        generated_at: from_ts(row.get(11)?),
    })
}

fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let channel: String = row.get(3)?;
    let status: String = row.get(5)?;
    let retry_count: i64 = row.get(8)?;
    Ok(Notification {
        id: row.get(0)?,
        meeting_id: row.get(1)?,
        user_id: row.get(2)?,
        channel: channel.parse().map_err(|e: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        scheduled_time: from_ts(row.get(4)?),
        status: status.parse().map_err(|e: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
        })?,
        sent_time: row.get::<_, Option<i64>>(6)?.map(from_ts),
        delivered_time: row.get::<_, Option<i64>>(7)?.map(from_ts),
        retry_count: retry_count.max(0) as u32,
        error_message: row.get(9)?,
    })
}
