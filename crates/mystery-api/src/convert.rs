//! Row-to-wire conversions. Corrupt stored values are logged and replaced
//! with defaults rather than failing the whole listing.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use mystery_db::models::{MessageRow, SentMessageRow, UserRow};
use mystery_types::models::{Message, SentMessage, User};

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') form, no timezone. Treat as UTC.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .ok()
}

fn timestamp_or_default(raw: &str, field: &str, row_id: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|| {
        warn!("Corrupt {} '{}' on row '{}'", field, raw, row_id);
        DateTime::default()
    })
}

fn uuid_or_default(raw: &str, field: &str, row_id: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", field, raw, row_id, e);
        Uuid::default()
    })
}

pub fn user_from_row(row: &UserRow) -> User {
    User {
        id: uuid_or_default(&row.id, "id", &row.id),
        username: row.username.clone(),
        email: row.email.clone(),
        is_verified: row.is_verified,
        is_accepting_messages: row.is_accepting_messages,
        created_at: timestamp_or_default(&row.created_at, "created_at", &row.id),
    }
}

pub fn message_from_row(row: MessageRow) -> Message {
    Message {
        id: uuid_or_default(&row.id, "id", &row.id),
        created_at: timestamp_or_default(&row.created_at, "created_at", &row.id),
        sender_id: row
            .sender_id
            .as_deref()
            .map(|raw| uuid_or_default(raw, "sender_id", &row.id)),
        replied_at: row
            .replied_at
            .as_deref()
            .map(|raw| timestamp_or_default(raw, "replied_at", &row.id)),
        content: row.content,
        reply: row.reply,
    }
}

pub fn sent_message_from_row(row: SentMessageRow) -> SentMessage {
    SentMessage {
        id: uuid_or_default(&row.id, "id", &row.id),
        created_at: timestamp_or_default(&row.created_at, "created_at", &row.id),
        replied_at: row
            .replied_at
            .as_deref()
            .map(|raw| timestamp_or_default(raw, "replied_at", &row.id)),
        receiver_username: row.receiver_username,
        content: row.content,
        reply: row.reply,
        is_private_reply: true,
    }
}
