//! Message storage operations

use rusqlite::{params, Connection};

use super::parse::{parse_datetime, parse_uuid};
use crate::error::Result;
use crate::models::{ChatMessage, MessageDisplay};

pub struct MessageStore<'a> {
    conn: &'a Connection,
}

impl<'a> MessageStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Persist a new message
    pub fn create(&self, message: &ChatMessage) -> Result<()> {
        self.conn.execute(
            "INSERT INTO messages (id, sender_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                message.id.to_string(),
                message.sender_id.to_string(),
                message.content,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// List the most recent messages with sender info, oldest first
    pub fn list_recent(&self, limit: u32) -> Result<Vec<MessageDisplay>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.id, u.username, m.content, m.created_at
             FROM messages m
             INNER JOIN users u ON u.id = m.sender_id
             ORDER BY m.created_at DESC
             LIMIT ?1",
        )?;

        let messages: Vec<MessageDisplay> = stmt
            .query_map(params![limit], |row| {
                Ok(MessageDisplay {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    sender_username: row.get(1)?,
                    content: row.get(2)?,
                    timestamp: parse_datetime(&row.get::<_, String>(3)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Reverse to get chronological order
        let mut messages = messages;
        messages.reverse();
        Ok(messages)
    }

    /// Total message count
    pub fn count(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
