use crate::models::{MessageRow, SentMessageRow, UserRow};
use crate::{Database, format_timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::{debug, info};

const USER_COLUMNS: &str = "id, username, email, password, verify_code, verify_code_expiry, \
                            is_verified, is_accepting_messages, created_at";

const MESSAGE_COLUMNS: &str = "id, owner_id, sender_id, content, reply, replied_at, created_at";

/// Account data supplied at sign-up.
pub struct PendingUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub verify_code: &'a str,
    pub verify_code_expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// A fresh unverified account was inserted.
    Created { id: String },
    /// An unverified account with the same email got new credentials.
    Refreshed { id: String },
    /// A verified account already owns the username.
    UsernameTaken,
    /// A verified account already owns the email.
    EmailTaken,
}

#[derive(Debug, Clone)]
pub enum AppendOutcome {
    Appended(MessageRow),
    OwnerNotFound,
    NotAccepting,
}

impl Database {
    // -- Users --

    /// Registers or re-registers an unverified account in one transaction.
    ///
    /// Usernames are only reserved by verified accounts: an unverified account
    /// squatting on the requested username under another email is removed.
    pub fn register_pending_user(
        &self,
        new_id: &str,
        user: &PendingUser<'_>,
        now: DateTime<Utc>,
    ) -> Result<SignUpOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let by_username = query_user_by_username(&tx, user.username)?;
            if by_username.as_ref().is_some_and(|u| u.is_verified) {
                return Ok(SignUpOutcome::UsernameTaken);
            }

            let by_email = query_user_by_email(&tx, user.email)?;
            if by_email.as_ref().is_some_and(|u| u.is_verified) {
                return Ok(SignUpOutcome::EmailTaken);
            }

            if let Some(squatter) = &by_username {
                let same_account = by_email.as_ref().is_some_and(|u| u.id == squatter.id);
                if !same_account {
                    tx.execute("DELETE FROM users WHERE id = ?1 AND is_verified = 0", [&squatter.id])?;
                    info!("Reclaimed username '{}' from unverified account {}", squatter.username, squatter.id);
                }
            }

            let expiry = format_timestamp(user.verify_code_expiry);
            let outcome = match by_email {
                Some(existing) => {
                    tx.execute(
                        "UPDATE users
                         SET username = ?1, password = ?2, verify_code = ?3, verify_code_expiry = ?4
                         WHERE id = ?5",
                        rusqlite::params![user.username, user.password_hash, user.verify_code, expiry, existing.id],
                    )?;
                    SignUpOutcome::Refreshed { id: existing.id }
                }
                None => {
                    tx.execute(
                        "INSERT INTO users
                            (id, username, email, password, verify_code, verify_code_expiry,
                             is_verified, is_accepting_messages, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1, ?7)",
                        rusqlite::params![
                            new_id,
                            user.username,
                            user.email,
                            user.password_hash,
                            user.verify_code,
                            expiry,
                            format_timestamp(now),
                        ],
                    )?;
                    SignUpOutcome::Created { id: new_id.to_string() }
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Looks an account up by username or email.
    pub fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1 OR email = ?1");
            conn.query_row(&sql, [identifier], user_from_row).optional()
        })
    }

    pub fn is_username_taken(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 AND is_verified = 1)",
                [username],
                |row| row.get(0),
            )?;
            Ok(taken)
        })
    }

    pub fn mark_verified(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET is_verified = 1 WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// Returns the updated account, or `None` when it no longer exists.
    pub fn set_accepting_messages(&self, id: &str, accepting: bool) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_accepting_messages = ?1 WHERE id = ?2",
                rusqlite::params![accepting, id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user_by_id(conn, id)
        })
    }

    // -- Messages --

    /// Appends a message to an owner's collection. The owner lookup, the
    /// acceptance check and the insert happen under one lock, and the append
    /// itself is a single INSERT, so concurrent senders never overwrite each
    /// other.
    pub fn append_message(
        &self,
        id: &str,
        owner_username: &str,
        content: &str,
        sender_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AppendOutcome> {
        self.with_conn(|conn| {
            let owner: Option<(String, bool)> = conn
                .query_row(
                    "SELECT id, is_accepting_messages FROM users WHERE username = ?1",
                    [owner_username],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((owner_id, accepting)) = owner else {
                return Ok(AppendOutcome::OwnerNotFound);
            };
            if !accepting {
                return Ok(AppendOutcome::NotAccepting);
            }

            let created_at = format_timestamp(now);
            conn.execute(
                "INSERT INTO messages (id, owner_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, owner_id, sender_id, content, created_at],
            )?;
            debug!("Appended message {} for owner {}", id, owner_id);

            Ok(AppendOutcome::Appended(MessageRow {
                id: id.to_string(),
                owner_id,
                sender_id: sender_id.map(str::to_string),
                content: content.to_string(),
                reply: None,
                replied_at: None,
                created_at,
            }))
        })
    }

    /// Every message received by `owner_id`, newest first.
    pub fn get_inbox(&self, owner_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE owner_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The owner's public Q&A board: anonymous messages that received a
    /// reply, most recently answered first.
    pub fn get_public_messages(&self, owner_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE owner_id = ?1 AND reply IS NOT NULL AND sender_id IS NULL
                 ORDER BY replied_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Everything `sender_id` has sent, across all owners, newest first.
    pub fn get_sent_messages(&self, sender_id: &str) -> Result<Vec<SentMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, u.username, m.content, m.reply, m.replied_at, m.created_at
                 FROM messages m
                 JOIN users u ON m.owner_id = u.id
                 WHERE m.sender_id = ?1
                 ORDER BY m.created_at DESC, m.rowid DESC",
            )?;
            let rows = stmt
                .query_map([sender_id], |row| {
                    Ok(SentMessageRow {
                        id: row.get(0)?,
                        receiver_username: row.get(1)?,
                        content: row.get(2)?,
                        reply: row.get(3)?,
                        replied_at: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Sets (or overwrites) the reply on one of the owner's messages.
    /// Returns `None` when the owner has no message with that id.
    pub fn reply_to_message(
        &self,
        owner_id: &str,
        message_id: &str,
        reply: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE messages SET reply = ?1, replied_at = ?2
                 WHERE id = ?3 AND owner_id = ?4
                 RETURNING {MESSAGE_COLUMNS}"
            );
            conn.query_row(
                &sql,
                rusqlite::params![reply, format_timestamp(now), message_id, owner_id],
                message_from_row,
            )
            .optional()
        })
    }

    /// Removes one of the owner's messages. Returns `false` when it was not
    /// there to begin with.
    pub fn delete_message(&self, owner_id: &str, message_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND owner_id = ?2",
                [message_id, owner_id],
            )?;
            Ok(removed > 0)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
    conn.query_row(&sql, [username], user_from_row).optional()
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
    conn.query_row(&sql, [email], user_from_row).optional()
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    conn.query_row(&sql, [id], user_from_row).optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        verify_code: row.get(4)?,
        verify_code_expiry: row.get(5)?,
        is_verified: row.get(6)?,
        is_accepting_messages: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        reply: row.get(4)?,
        replied_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
