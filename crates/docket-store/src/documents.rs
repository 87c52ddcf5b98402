//! CRUD operations for [`Document`] metadata rows.
//!
//! Only metadata lives here; the bytes are written by the server's blob
//! store.  Keeping the two in step across failures is the server's job.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{enum_parse_err, timestamp_col, uuid_col, Document, DocumentCategory};

/// Optional listing filters.  All present fields must match; `q` is a
/// substring match over the original name and description.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub client_id: Option<Uuid>,
    pub case_id: Option<Uuid>,
    pub category: Option<DocumentCategory>,
    pub q: Option<String>,
}

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new document metadata row.
    pub fn insert_document(&self, document: &Document) -> Result<()> {
        self.conn().execute(
            "INSERT INTO documents (id, filename, original_name, storage_path, size, mime_type, client_id, case_id, category, description, uploaded_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                document.id.to_string(),
                document.filename,
                document.original_name,
                document.storage_path,
                document.size,
                document.mime_type,
                document.client_id.map(|c| c.to_string()),
                document.case_id.map(|c| c.to_string()),
                document.category.as_str(),
                document.description,
                document.uploaded_by.to_string(),
                document.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single document by UUID.
    pub fn get_document(&self, id: Uuid) -> Result<Document> {
        self.conn()
            .query_row(
                "SELECT id, filename, original_name, storage_path, size, mime_type, client_id, case_id, category, description, uploaded_by, created_at
                 FROM documents
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_document,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List documents matching the filter, newest first.
    pub fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        // The filter shape is fixed, so a static query with nullable
        // parameters keeps this a single prepared statement.
        let mut stmt = self.conn().prepare(
            "SELECT id, filename, original_name, storage_path, size, mime_type, client_id, case_id, category, description, uploaded_by, created_at
             FROM documents
             WHERE (?1 IS NULL OR client_id = ?1)
               AND (?2 IS NULL OR case_id = ?2)
               AND (?3 IS NULL OR category = ?3)
               AND (?4 IS NULL OR original_name LIKE ?4 OR description LIKE ?4)
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(
            params![
                filter.client_id.map(|c| c.to_string()),
                filter.case_id.map(|c| c.to_string()),
                filter.category.map(|c| c.as_str()),
                filter.q.as_ref().map(|q| format!("%{q}%")),
            ],
            row_to_document,
        )?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }
        Ok(documents)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a document metadata row.  Returns `true` if a row was deleted.
    pub fn delete_document(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM documents WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Document`].
fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id_str: String = row.get(0)?;
    let client_id_str: Option<String> = row.get(6)?;
    let case_id_str: Option<String> = row.get(7)?;
    let category_str: String = row.get(8)?;
    let uploaded_by_str: String = row.get(10)?;
    let created_str: String = row.get(11)?;

    let client_id = match client_id_str {
        Some(s) => Some(uuid_col(6, &s)?),
        None => None,
    };
    let case_id = match case_id_str {
        Some(s) => Some(uuid_col(7, &s)?),
        None => None,
    };
    let category =
        DocumentCategory::parse(&category_str).ok_or_else(|| enum_parse_err(8, &category_str))?;

    Ok(Document {
        id: uuid_col(0, &id_str)?,
        filename: row.get(1)?,
        original_name: row.get(2)?,
        storage_path: row.get(3)?,
        size: row.get(4)?,
        mime_type: row.get(5)?,
        client_id,
        case_id,
        category,
        description: row.get(9)?,
        uploaded_by: uuid_col(10, &uploaded_by_str)?,
        created_at: timestamp_col(11, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Client, User, UserRole};
    use chrono::Utc;

    fn seed_user(db: &Database) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            email: format!("{}@firm.example", Uuid::new_v4()),
            password_hash: "$2b$12$x".into(),
            role: UserRole::Admin,
            profile_photo: None,
            created_at: Utc::now(),
        };
        db.create_user(&user).unwrap();
        user.id
    }

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

    fn sample_document(uploaded_by: Uuid, client_id: Option<Uuid>) -> Document {
        let id = Uuid::new_v4();
        Document {
            id,
            filename: format!("{id}.pdf"),
            original_name: "retainer-agreement.pdf".into(),
            storage_path: format!(
                "{}/_general/{id}.pdf",
                client_id.map_or("_uncategorized".to_string(), |c| c.to_string())
            ),
            size: 14_322,
            mime_type: "application/pdf".into(),
            client_id,
            case_id: None,
            category: DocumentCategory::Contract,
            description: None,
            uploaded_by,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn filter_by_client_and_category() {
        let db = Database::open_in_memory().unwrap();
        let user_id = seed_user(&db);
        let client_id = seed_client(&db);

        db.insert_document(&sample_document(user_id, Some(client_id)))
            .unwrap();
        db.insert_document(&sample_document(user_id, None)).unwrap();

        let mut evidence = sample_document(user_id, Some(client_id));
        evidence.category = DocumentCategory::Evidence;
        db.insert_document(&evidence).unwrap();

        assert_eq!(db.list_documents(&DocumentFilter::default()).unwrap().len(), 3);

        let for_client = db
            .list_documents(&DocumentFilter {
                client_id: Some(client_id),
                ..DocumentFilter::default()
            })
            .unwrap();
        assert_eq!(for_client.len(), 2);

        let only_evidence = db
            .list_documents(&DocumentFilter {
                client_id: Some(client_id),
                category: Some(DocumentCategory::Evidence),
                ..DocumentFilter::default()
            })
            .unwrap();
        assert_eq!(only_evidence.len(), 1);
        assert_eq!(only_evidence[0].id, evidence.id);
    }

    #[test]
    fn q_searches_name_and_description() {
        let db = Database::open_in_memory().unwrap();
        let user_id = seed_user(&db);

        let by_name = sample_document(user_id, None);
        db.insert_document(&by_name).unwrap();

        let mut by_description = sample_document(user_id, None);
        by_description.original_name = "scan0001.pdf".into();
        by_description.description = Some("signed retainer, countersigned copy".into());
        db.insert_document(&by_description).unwrap();

        let hits = db
            .list_documents(&DocumentFilter {
                q: Some("retainer".into()),
                ..DocumentFilter::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 2);

        let hits = db
            .list_documents(&DocumentFilter {
                q: Some("countersigned".into()),
                ..DocumentFilter::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, by_description.id);

        let hits = db
            .list_documents(&DocumentFilter {
                q: Some("deposition".into()),
                ..DocumentFilter::default()
            })
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn client_delete_keeps_document_row_unlinked() {
        // documents.client_id is ON DELETE SET NULL, not CASCADE: the file
        // and its metadata outlive the client record.
        let db = Database::open_in_memory().unwrap();
        let user_id = seed_user(&db);
        let client_id = seed_client(&db);
        let doc = sample_document(user_id, Some(client_id));
        db.insert_document(&doc).unwrap();

        db.delete_client(client_id).unwrap();

        let fetched = db.get_document(doc.id).unwrap();
        assert_eq!(fetched.client_id, None);
        // The recorded blob location does not move when the link is nulled.
        assert_eq!(fetched.storage_path, doc.storage_path);
    }
}
