/// Database row types. These map directly to SQLite rows.
/// Distinct from mystery-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub verify_code: String,
    pub verify_code_expiry: String,
    pub is_verified: bool,
    pub is_accepting_messages: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub owner_id: String,
    pub sender_id: Option<String>,
    pub content: String,
    pub reply: Option<String>,
    pub replied_at: Option<String>,
    pub created_at: String,
}

/// A message joined with the username of the account it was sent to.
#[derive(Debug, Clone)]
pub struct SentMessageRow {
    pub id: String,
    pub receiver_username: String,
    pub content: String,
    pub reply: Option<String>,
    pub replied_at: Option<String>,
    pub created_at: String,
}
