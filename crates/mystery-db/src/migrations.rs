use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                      TEXT PRIMARY KEY,
                username                TEXT NOT NULL UNIQUE COLLATE NOCASE,
                email                   TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password                TEXT NOT NULL,
                verify_code             TEXT NOT NULL,
                verify_code_expiry      TEXT NOT NULL,
                is_verified             INTEGER NOT NULL DEFAULT 0,
                is_accepting_messages   INTEGER NOT NULL DEFAULT 1,
                created_at              TEXT NOT NULL
            );

            -- Messages live in their own table keyed by owner. sender_id is a
            -- plain back-reference: it identifies, it does not own.
            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                sender_id   TEXT,
                content     TEXT NOT NULL,
                reply       TEXT,
                replied_at  TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_owner
                ON messages(owner_id, created_at);

            CREATE INDEX idx_messages_sender
                ON messages(sender_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
