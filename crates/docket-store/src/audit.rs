//! Append-only persistence for [`AuditLog`] rows.
//!
//! There is deliberately no update or delete here.  Redaction of sensitive
//! detail values happens in the server before rows reach this module.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{timestamp_col, uuid_col, AuditLog};

/// Optional constraints on an audit query.  All absent means the global
/// recency feed.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
}

impl Database {
    /// Append one audit entry.
    pub fn insert_audit_log(&self, entry: &AuditLog) -> Result<()> {
        let details = entry
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn().execute(
            "INSERT INTO audit_logs (id, user_id, action, resource_type, resource_id, status, ip, user_agent, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id.to_string(),
                entry.user_id.map(|u| u.to_string()),
                entry.action,
                entry.resource_type,
                entry.resource_id,
                entry.status,
                entry.ip,
                entry.user_agent,
                details,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Page through the audit trail, newest first, optionally narrowed to
    /// one actor or one resource.
    pub fn list_audit_logs(
        &self,
        filter: &AuditLogFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<AuditLog>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, action, resource_type, resource_id, status, ip, user_agent, details, created_at
             FROM audit_logs
             WHERE (?1 IS NULL OR user_id = ?1)
               AND (?2 IS NULL OR resource_type = ?2)
               AND (?3 IS NULL OR resource_id = ?3)
             ORDER BY created_at DESC
             LIMIT ?4 OFFSET ?5",
        )?;

        let rows = stmt.query_map(
            params![
                filter.user_id.map(|u| u.to_string()),
                filter.resource_type,
                filter.resource_id,
                limit,
                offset
            ],
            row_to_audit_log,
        )?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to an [`AuditLog`].
fn row_to_audit_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditLog> {
    let id_str: String = row.get(0)?;
    let user_id_str: Option<String> = row.get(1)?;
    let details_json: Option<String> = row.get(8)?;
    let created_str: String = row.get(9)?;

    let user_id = match user_id_str {
        Some(s) => Some(uuid_col(1, &s)?),
        None => None,
    };

    let details = details_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(AuditLog {
        id: uuid_col(0, &id_str)?,
        user_id,
        action: row.get(2)?,
        resource_type: row.get(3)?,
        resource_id: row.get(4)?,
        status: row.get(5)?,
        ip: row.get(6)?,
        user_agent: row.get(7)?,
        details,
        created_at: timestamp_col(9, &created_str)?,
    })
}
