use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account as exposed over the API. Never carries the password hash or the
/// pending verification code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
    pub is_accepting_messages: bool,
    pub created_at: DateTime<Utc>,
}

/// A message as the owner (inbox) and visitors (public board) see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Set when an authenticated user sent the message. Attributed messages
    /// never show up on the public board.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sender_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub replied_at: Option<DateTime<Utc>>,
}

impl Message {
    /// True when the message belongs on the owner's public Q&A board.
    pub fn is_public_answer(&self) -> bool {
        self.reply.is_some() && self.sender_id.is_none()
    }
}

/// A message seen from the sender's outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub id: Uuid,
    pub receiver_username: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reply: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub replied_at: Option<DateTime<Utc>>,
    /// Replies to attributed messages are only ever shown to the sender.
    pub is_private_reply: bool,
}
