//! CRUD operations for [`Case`] records.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{enum_parse_err, timestamp_col, uuid_col, Case, CaseStatus};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new case.
    pub fn create_case(&self, case: &Case) -> Result<()> {
        self.conn().execute(
            "INSERT INTO cases (id, client_id, title, case_type, status, description, total_fees, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                case.id.to_string(),
                case.client_id.to_string(),
                case.title,
                case.case_type,
                case.status.as_str(),
                case.description,
                case.total_fees,
                case.created_at.to_rfc3339(),
                case.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single case by UUID.
    pub fn get_case(&self, id: Uuid) -> Result<Case> {
        self.conn()
            .query_row(
                "SELECT id, client_id, title, case_type, status, description, total_fees, created_at, updated_at
                 FROM cases
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_case,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all cases, newest first.
    pub fn list_cases(&self) -> Result<Vec<Case>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, client_id, title, case_type, status, description, total_fees, created_at, updated_at
             FROM cases
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_case)?;

        let mut cases = Vec::new();
        for row in rows {
            cases.push(row?);
        }
        Ok(cases)
    }

    /// List cases belonging to one client, newest first.
    pub fn list_cases_for_client(&self, client_id: Uuid) -> Result<Vec<Case>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, client_id, title, case_type, status, description, total_fees, created_at, updated_at
             FROM cases
             WHERE client_id = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![client_id.to_string()], row_to_case)?;

        let mut cases = Vec::new();
        for row in rows {
            cases.push(row?);
        }
        Ok(cases)
    }

    /// Substring search over title, type, and description, newest first.
    pub fn search_cases(&self, query: &str) -> Result<Vec<Case>> {
        let pattern = format!("%{query}%");
        let mut stmt = self.conn().prepare(
            "SELECT id, client_id, title, case_type, status, description, total_fees, created_at, updated_at
             FROM cases
             WHERE title LIKE ?1 OR case_type LIKE ?1 OR description LIKE ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![pattern], row_to_case)?;

        let mut cases = Vec::new();
        for row in rows {
            cases.push(row?);
        }
        Ok(cases)
    }

    /// Number of cases currently in the given status.
    pub fn count_cases_with_status(&self, status: CaseStatus) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM cases WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace all mutable fields of a case.  `updated_at` is taken from the
    /// struct, so callers stamp it before saving.
    pub fn update_case(&self, case: &Case) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE cases
             SET title = ?2, case_type = ?3, status = ?4, description = ?5, total_fees = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                case.id.to_string(),
                case.title,
                case.case_type,
                case.status.as_str(),
                case.description,
                case.total_fees,
                case.updated_at.to_rfc3339(),
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

/// Map a `rusqlite::Row` to a [`Case`].
fn row_to_case(row: &rusqlite::Row<'_>) -> rusqlite::Result<Case> {
    let id_str: String = row.get(0)?;
    let client_id_str: String = row.get(1)?;
    let status_str: String = row.get(4)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    let status = CaseStatus::parse(&status_str).ok_or_else(|| enum_parse_err(4, &status_str))?;

    Ok(Case {
        id: uuid_col(0, &id_str)?,
        client_id: uuid_col(1, &client_id_str)?,
        title: row.get(2)?,
        case_type: row.get(3)?,
        status,
        description: row.get(5)?,
        total_fees: row.get(6)?,
        created_at: timestamp_col(7, &created_str)?,
        updated_at: timestamp_col(8, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Client;
    use chrono::Utc;

    fn seed_client(db: &Database) -> Uuid {
        let client = Client {
            id: Uuid::new_v4(),
            first_name: "Dana".into(),
            last_name: "Whitfield".into(),
            email: format!("{}@example.com", Uuid::new_v4()),
            phone: None,
            address: None,
            notes: None,
            created_at: Utc::now(),
        };
        db.create_client(&client).unwrap();
        client.id
    }

    fn sample_case(client_id: Uuid, status: CaseStatus) -> Case {
        Case {
            id: Uuid::new_v4(),
            client_id,
            title: "Whitfield v. Harmon".into(),
            case_type: "civil-litigation".into(),
            status,
            description: Some("Contract dispute over delivery terms".into()),
            total_fees: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_survives_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let client_id = seed_client(&db);

        let case = sample_case(client_id, CaseStatus::OnHold);
        db.create_case(&case).unwrap();

        let fetched = db.get_case(case.id).unwrap();
        assert_eq!(fetched.status, CaseStatus::OnHold);
        assert_eq!(fetched.client_id, client_id);
    }

    #[test]
    fn count_by_status() {
        let db = Database::open_in_memory().unwrap();
        let client_id = seed_client(&db);

        db.create_case(&sample_case(client_id, CaseStatus::Active))
            .unwrap();
        db.create_case(&sample_case(client_id, CaseStatus::Active))
            .unwrap();
        db.create_case(&sample_case(client_id, CaseStatus::Closed))
            .unwrap();

        assert_eq!(db.count_cases_with_status(CaseStatus::Active).unwrap(), 2);
        assert_eq!(db.count_cases_with_status(CaseStatus::Closed).unwrap(), 1);
        assert_eq!(db.count_cases_with_status(CaseStatus::OnHold).unwrap(), 0);
    }

    #[test]
    fn deleting_client_cascades_to_cases() {
        let db = Database::open_in_memory().unwrap();
        let client_id = seed_client(&db);
        let case = sample_case(client_id, CaseStatus::Active);
        db.create_case(&case).unwrap();

        db.delete_client(client_id).unwrap();
        assert!(matches!(
            db.get_case(case.id).unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[test]
    fn unknown_client_is_a_constraint_error() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .create_case(&sample_case(Uuid::new_v4(), CaseStatus::Active))
            .unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }
}
