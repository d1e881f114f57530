use crate::Database;
use crate::models::{ConversationListRow, ConversationRow, MessageRow};
use anyhow::Result;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

/// Timestamps are stored as fixed-width RFC 3339 strings with microseconds,
/// so lexical order is chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

impl Database {
    // -- Conversations --

    /// Returns the conversation for the pair, creating it with `new_id` if
    /// neither orientation exists yet. The bool is true when a row was inserted.
    pub fn get_or_create_conversation(
        &self,
        new_id: &str,
        client_id: &str,
        seller_id: &str,
    ) -> Result<(ConversationRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing = tx
                .query_row(
                    "SELECT id, client_id, seller_id, created_at FROM conversations
                     WHERE (client_id = ?1 AND seller_id = ?2) OR (client_id = ?2 AND seller_id = ?1)
                     LIMIT 1",
                    (client_id, seller_id),
                    conversation_from_row,
                )
                .optional()?;

            if let Some(row) = existing {
                return Ok((row, false));
            }

            let created_at = format_timestamp(Utc::now());
            tx.execute(
                "INSERT INTO conversations (id, client_id, seller_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                (new_id, client_id, seller_id, &created_at),
            )?;
            tx.commit()?;

            Ok((
                ConversationRow {
                    id: new_id.to_string(),
                    client_id: client_id.to_string(),
                    seller_id: seller_id.to_string(),
                    created_at,
                },
                true,
            ))
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, client_id, seller_id, created_at FROM conversations WHERE id = ?1",
                    [id],
                    conversation_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Conversations the user takes part in, with the count of messages the
    /// user has not read yet.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationListRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.client_id, c.seller_id, c.created_at,
                        (SELECT COUNT(*) FROM messages m
                         WHERE m.conversation_id = c.id AND m.sender_id != ?1 AND m.is_read = 0)
                 FROM conversations c
                 WHERE c.client_id = ?1 OR c.seller_id = ?1",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationListRow {
                        conversation: conversation_from_row(row)?,
                        unread_count: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Latest message of every conversation the user takes part in.
    pub fn last_messages_for_user(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.conversation_id, m.sender_id, m.body, m.is_read, m.created_at
                 FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE (c.client_id = ?1 OR c.seller_id = ?1)
                   AND m.rowid = (
                       SELECT m2.rowid FROM messages m2
                       WHERE m2.conversation_id = m.conversation_id
                       ORDER BY m2.created_at DESC, m2.rowid DESC
                       LIMIT 1
                   )",
            )?;

            let rows = stmt
                .query_map([user_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    /// Appends a message. `created_at` never goes backwards within a
    /// conversation: a clock that lags the previous message is nudged one
    /// microsecond past it.
    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let last: Option<String> = tx
                .query_row(
                    "SELECT created_at FROM messages WHERE conversation_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    [conversation_id],
                    |row| row.get(0),
                )
                .optional()?;

            let mut now = Utc::now();
            if let Some(last) = last {
                let last = parse_timestamp(&last)?;
                if now <= last {
                    now = last + Duration::microseconds(1);
                }
            }
            let created_at = format_timestamp(now);

            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, body, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                (id, conversation_id, sender_id, body, &created_at),
            )?;
            tx.commit()?;

            Ok(MessageRow {
                id: id.to_string(),
                conversation_id: conversation_id.to_string(),
                sender_id: sender_id.to_string(),
                body: body.to_string(),
                is_read: false,
                created_at,
            })
        })
    }

    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, conversation_id))
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, conversation_id, sender_id, body, is_read, created_at
                     FROM messages WHERE id = ?1",
                    [id],
                    message_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Sets `is_read` on one message if it is unread. Returns the number of
    /// rows changed (0 or 1).
    pub fn set_message_read(&self, id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1 WHERE id = ?1 AND is_read = 0",
                [id],
            )?;
            Ok(changed)
        })
    }

    /// Marks every unread message in the conversation that `reader_id` did
    /// not send. Returns the number of messages that changed.
    pub fn mark_conversation_read(&self, conversation_id: &str, reader_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
                (conversation_id, reader_id),
            )?;
            Ok(changed)
        })
    }
}

fn query_messages(conn: &Connection, conversation_id: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, sender_id, body, is_read, created_at
         FROM messages
         WHERE conversation_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt
        .query_map([conversation_id], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        client_id: row.get(1)?,
        seller_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        is_read: row.get(4)?,
        created_at: row.get(5)?,
    })
}
