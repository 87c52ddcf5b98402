//! CRUD operations for [`Consultation`] records.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{
    enum_parse_err, timestamp_col, uuid_col, Consultation, ConsultationKind, ConsultationStatus,
};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new consultation.
    pub fn create_consultation(&self, consultation: &Consultation) -> Result<()> {
        self.conn().execute(
            "INSERT INTO consultations (id, client_id, kind, case_type, scheduled_at, status, rate, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                consultation.id.to_string(),
                consultation.client_id.to_string(),
                consultation.kind.as_str(),
                consultation.case_type,
                consultation.scheduled_at.to_rfc3339(),
                consultation.status.as_str(),
                consultation.rate,
                consultation.description,
                consultation.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single consultation by UUID.
    pub fn get_consultation(&self, id: Uuid) -> Result<Consultation> {
        self.conn()
            .query_row(
                "SELECT id, client_id, kind, case_type, scheduled_at, status, rate, description, created_at
                 FROM consultations
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_consultation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all consultations, most recently scheduled first.
    pub fn list_consultations(&self) -> Result<Vec<Consultation>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, client_id, kind, case_type, scheduled_at, status, rate, description, created_at
             FROM consultations
             ORDER BY scheduled_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_consultation)?;

        let mut consultations = Vec::new();
        for row in rows {
            consultations.push(row?);
        }
        Ok(consultations)
    }

    /// List consultations for one client, most recently scheduled first.
    pub fn list_consultations_for_client(&self, client_id: Uuid) -> Result<Vec<Consultation>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, client_id, kind, case_type, scheduled_at, status, rate, description, created_at
             FROM consultations
             WHERE client_id = ?1
             ORDER BY scheduled_at DESC",
        )?;

        let rows = stmt.query_map(params![client_id.to_string()], row_to_consultation)?;

        let mut consultations = Vec::new();
        for row in rows {
            consultations.push(row?);
        }
        Ok(consultations)
    }

    /// Substring search over case type, description, and the client's name.
    pub fn search_consultations(&self, query: &str) -> Result<Vec<Consultation>> {
        let pattern = format!("%{query}%");
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.client_id, c.kind, c.case_type, c.scheduled_at, c.status, c.rate, c.description, c.created_at
             FROM consultations c
             JOIN clients cl ON cl.id = c.client_id
             WHERE c.case_type LIKE ?1 OR c.description LIKE ?1
                OR cl.first_name LIKE ?1 OR cl.last_name LIKE ?1
             ORDER BY c.scheduled_at DESC",
        )?;

        let rows = stmt.query_map(params![pattern], row_to_consultation)?;

        let mut consultations = Vec::new();
        for row in rows {
            consultations.push(row?);
        }
        Ok(consultations)
    }

    /// Number of consultations currently in the given status.
    pub fn count_consultations_with_status(&self, status: ConsultationStatus) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM consultations WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace all mutable fields of a consultation.
    pub fn update_consultation(&self, consultation: &Consultation) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE consultations
             SET kind = ?2, case_type = ?3, scheduled_at = ?4, status = ?5, rate = ?6, description = ?7
             WHERE id = ?1",
            params![
                consultation.id.to_string(),
                consultation.kind.as_str(),
                consultation.case_type,
                consultation.scheduled_at.to_rfc3339(),
                consultation.status.as_str(),
                consultation.rate,
                consultation.description,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Consultation`].
fn row_to_consultation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Consultation> {
    let id_str: String = row.get(0)?;
    let client_id_str: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let scheduled_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let created_str: String = row.get(8)?;

    let kind = ConsultationKind::parse(&kind_str).ok_or_else(|| enum_parse_err(2, &kind_str))?;
    let status =
        ConsultationStatus::parse(&status_str).ok_or_else(|| enum_parse_err(5, &status_str))?;

    Ok(Consultation {
        id: uuid_col(0, &id_str)?,
        client_id: uuid_col(1, &client_id_str)?,
        kind,
        case_type: row.get(3)?,
        scheduled_at: timestamp_col(4, &scheduled_str)?,
        status,
        rate: row.get(6)?,
        description: row.get(7)?,
        created_at: timestamp_col(8, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Client;
    use chrono::Utc;

    fn seed_client(db: &Database, first: &str, last: &str) -> Uuid {
        let client = Client {
            id: Uuid::new_v4(),
            first_name: first.into(),
            last_name: last.into(),
            email: format!("{}@example.com", Uuid::new_v4()),
            phone: None,
            address: None,
            notes: None,
            created_at: Utc::now(),
        };
        db.create_client(&client).unwrap();
        client.id
    }

    fn sample_consultation(client_id: Uuid) -> Consultation {
        Consultation {
            id: Uuid::new_v4(),
            client_id,
            kind: ConsultationKind::Phone,
            case_type: "family-law".into(),
            scheduled_at: Utc::now(),
            status: ConsultationStatus::Scheduled,
            rate: Some(150.0),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn kind_and_status_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let client_id = seed_client(&db, "Dana", "Whitfield");

        let mut c = sample_consultation(client_id);
        c.kind = ConsultationKind::InPerson;
        c.status = ConsultationStatus::NoShow;
        db.create_consultation(&c).unwrap();

        let fetched = db.get_consultation(c.id).unwrap();
        assert_eq!(fetched.kind, ConsultationKind::InPerson);
        assert_eq!(fetched.status, ConsultationStatus::NoShow);
    }

    #[test]
    fn search_reaches_client_name() {
        let db = Database::open_in_memory().unwrap();
        let dana = seed_client(&db, "Dana", "Whitfield");
        let marcus = seed_client(&db, "Marcus", "Reed");
        db.create_consultation(&sample_consultation(dana)).unwrap();
        db.create_consultation(&sample_consultation(marcus)).unwrap();

        let hits = db.search_consultations("reed").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].client_id, marcus);

        // Matching on the consultation's own fields still works.
        assert_eq!(db.search_consultations("family").unwrap().len(), 2);
    }
}
