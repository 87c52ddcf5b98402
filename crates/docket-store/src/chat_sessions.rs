//! Persistence for [`AiChatSession`] conversation state.

use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{timestamp_col, AiChatSession};

impl Database {
    /// Fetch a session by its client-generated id.
    pub fn get_chat_session(&self, session_id: &str) -> Result<AiChatSession> {
        self.conn()
            .query_row(
                "SELECT session_id, client_email, messages, status, created_at, updated_at
                 FROM ai_chat_sessions
                 WHERE session_id = ?1",
                params![session_id],
                row_to_chat_session,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Insert a session, or replace its mutable fields if the id exists.
    /// Chat sessions are created lazily on the first message.
    pub fn upsert_chat_session(&self, session: &AiChatSession) -> Result<()> {
        let messages = serde_json::to_string(&session.messages)?;
        self.conn().execute(
            "INSERT INTO ai_chat_sessions (session_id, client_email, messages, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(session_id) DO UPDATE SET
                 client_email = excluded.client_email,
                 messages     = excluded.messages,
                 status       = excluded.status,
                 updated_at   = excluded.updated_at",
            params![
                session.session_id,
                session.client_email,
                messages,
                session.status,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to an [`AiChatSession`].
fn row_to_chat_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<AiChatSession> {
    let messages_json: String = row.get(2)?;
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;

    let messages = serde_json::from_str(&messages_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(AiChatSession {
        session_id: row.get(0)?,
        client_email: row.get(1)?,
        messages,
        status: row.get(3)?,
        created_at: timestamp_col(4, &created_str)?,
        updated_at: timestamp_col(5, &updated_str)?,
    })
}
