//! CRUD operations for [`Communication`] log entries.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{
    enum_parse_err, timestamp_col, uuid_col, Communication, CommunicationDirection,
    CommunicationStatus,
};

impl Database {
    /// Append an entry to a client's correspondence log.
    pub fn insert_communication(&self, communication: &Communication) -> Result<()> {
        self.conn().execute(
            "INSERT INTO communications (id, client_id, direction, channel, subject, body, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                communication.id.to_string(),
                communication.client_id.to_string(),
                communication.direction.as_str(),
                communication.channel,
                communication.subject,
                communication.body,
                communication.status.as_str(),
                communication.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// List one client's correspondence, newest first.
    pub fn list_communications_for_client(&self, client_id: Uuid) -> Result<Vec<Communication>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, client_id, direction, channel, subject, body, status, created_at
             FROM communications
             WHERE client_id = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![client_id.to_string()], row_to_communication)?;

        let mut communications = Vec::new();
        for row in rows {
            communications.push(row?);
        }
        Ok(communications)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Communication`].
fn row_to_communication(row: &rusqlite::Row<'_>) -> rusqlite::Result<Communication> {
    let id_str: String = row.get(0)?;
    let client_id_str: String = row.get(1)?;
    let direction_str: String = row.get(2)?;
    let status_str: String = row.get(6)?;
    let created_str: String = row.get(7)?;

    let direction = CommunicationDirection::parse(&direction_str)
        .ok_or_else(|| enum_parse_err(2, &direction_str))?;
    let status =
        CommunicationStatus::parse(&status_str).ok_or_else(|| enum_parse_err(6, &status_str))?;

    Ok(Communication {
        id: uuid_col(0, &id_str)?,
        client_id: uuid_col(1, &client_id_str)?,
        direction,
        channel: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        status,
        created_at: timestamp_col(7, &created_str)?,
    })
}
