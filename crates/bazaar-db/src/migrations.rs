use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            client_id   TEXT NOT NULL,
            seller_id   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(client_id, seller_id)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_seller
            ON conversations(seller_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL,
            body            TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        -- Nothing may ever clear a read flag
        CREATE TRIGGER IF NOT EXISTS messages_read_is_sticky
            BEFORE UPDATE OF is_read ON messages
            WHEN OLD.is_read = 1 AND NEW.is_read = 0
        BEGIN
            SELECT RAISE(ABORT, 'is_read cannot be cleared');
        END;
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
