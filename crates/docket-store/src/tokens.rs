//! CRUD operations for [`ClientToken`] portal credentials.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{timestamp_col, uuid_col, ClientToken};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new portal token.
    pub fn insert_client_token(&self, token: &ClientToken) -> Result<()> {
        self.conn().execute(
            "INSERT INTO client_tokens (id, client_id, token, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                token.id.to_string(),
                token.client_id.to_string(),
                token.token,
                token.expires_at.to_rfc3339(),
                token.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Resolve a token value to its row, iff it has not expired at `now`.
    ///
    /// Validity is strict: a token whose `expires_at` equals `now` is
    /// already expired.  Expired and unknown tokens are indistinguishable
    /// to the caller.
    pub fn get_valid_token(&self, token: &str, now: DateTime<Utc>) -> Result<ClientToken> {
        self.conn()
            .query_row(
                "SELECT id, client_id, token, expires_at, created_at
                 FROM client_tokens
                 WHERE token = ?1 AND expires_at > ?2",
                params![token, now.to_rfc3339()],
                row_to_client_token,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete every token that expired at or before `now`.  Returns the
    /// number of rows removed; the sweep logs this.
    pub fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM client_tokens WHERE expires_at <= ?1",
            params![now.to_rfc3339()],
        )?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`ClientToken`].
fn row_to_client_token(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClientToken> {
    let id_str: String = row.get(0)?;
    let client_id_str: String = row.get(1)?;
    let expires_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    Ok(ClientToken {
        id: uuid_col(0, &id_str)?,
        client_id: uuid_col(1, &client_id_str)?,
        token: row.get(2)?,
        expires_at: timestamp_col(3, &expires_str)?,
        created_at: timestamp_col(4, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Client;
    use chrono::Duration;

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

    fn token_row(client_id: Uuid, value: &str, expires_at: DateTime<Utc>) -> ClientToken {
        ClientToken {
            id: Uuid::new_v4(),
            client_id,
            token: value.into(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn valid_until_expiry_then_invalid() {
        let db = Database::open_in_memory().unwrap();
        let client_id = seed_client(&db);
        let now = Utc::now();
        let expires = now + Duration::hours(24);
        db.insert_client_token(&token_row(client_id, "aa11", expires))
            .unwrap();

        // One second before expiry: resolves.
        let resolved = db
            .get_valid_token("aa11", expires - Duration::seconds(1))
            .unwrap();
        assert_eq!(resolved.client_id, client_id);

        // Exactly at expiry and after: gone.
        assert!(matches!(
            db.get_valid_token("aa11", expires).unwrap_err(),
            StoreError::NotFound
        ));
        assert!(matches!(
            db.get_valid_token("aa11", expires + Duration::seconds(1))
                .unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[test]
    fn unknown_token_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_valid_token("beef", Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn sweep_removes_only_expired_rows() {
        let db = Database::open_in_memory().unwrap();
        let client_id = seed_client(&db);
        let now = Utc::now();

        db.insert_client_token(&token_row(client_id, "old1", now - Duration::hours(2)))
            .unwrap();
        db.insert_client_token(&token_row(client_id, "old2", now - Duration::seconds(1)))
            .unwrap();
        db.insert_client_token(&token_row(client_id, "live", now + Duration::hours(24)))
            .unwrap();

        assert_eq!(db.delete_expired_tokens(now).unwrap(), 2);
        assert!(db.get_valid_token("live", now).is_ok());

        // A second sweep finds nothing.
        assert_eq!(db.delete_expired_tokens(now).unwrap(), 0);
    }
}
