//! CRUD operations for [`Client`] records.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{timestamp_col, uuid_col, Client};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new client.  Fails with [`StoreError::Duplicate`] if the
    /// email already belongs to another client.
    pub fn create_client(&self, client: &Client) -> Result<()> {
        self.conn().execute(
            "INSERT INTO clients (id, first_name, last_name, email, phone, address, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                client.id.to_string(),
                client.first_name,
                client.last_name,
                client.email,
                client.phone,
                client.address,
                client.notes,
                client.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single client by UUID.
    pub fn get_client(&self, id: Uuid) -> Result<Client> {
        self.conn()
            .query_row(
                "SELECT id, first_name, last_name, email, phone, address, notes, created_at
                 FROM clients
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_client,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch a single client by email.  Consultation booking uses this to
    /// decide whether to reuse an existing client or create one.
    pub fn get_client_by_email(&self, email: &str) -> Result<Client> {
        self.conn()
            .query_row(
                "SELECT id, first_name, last_name, email, phone, address, notes, created_at
                 FROM clients
                 WHERE email = ?1",
                params![email],
                row_to_client,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all clients, newest first.
    pub fn list_clients(&self) -> Result<Vec<Client>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, first_name, last_name, email, phone, address, notes, created_at
             FROM clients
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_client)?;

        let mut clients = Vec::new();
        for row in rows {
            clients.push(row?);
        }
        Ok(clients)
    }

    /// Substring search over name and email, newest first.
    pub fn search_clients(&self, query: &str) -> Result<Vec<Client>> {
        let pattern = format!("%{query}%");
        let mut stmt = self.conn().prepare(
            "SELECT id, first_name, last_name, email, phone, address, notes, created_at
             FROM clients
             WHERE first_name LIKE ?1 OR last_name LIKE ?1 OR email LIKE ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![pattern], row_to_client)?;

        let mut clients = Vec::new();
        for row in rows {
            clients.push(row?);
        }
        Ok(clients)
    }

    /// Total number of clients.
    pub fn count_clients(&self) -> Result<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace all mutable fields of a client.
    pub fn update_client(&self, client: &Client) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE clients
             SET first_name = ?2, last_name = ?3, email = ?4, phone = ?5, address = ?6, notes = ?7
             WHERE id = ?1",
            params![
                client.id.to_string(),
                client.first_name,
                client.last_name,
                client.email,
                client.phone,
                client.address,
                client.notes,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a client by UUID.  Returns `true` if a row was deleted.
    /// Cases, consultations, invoices, tokens, and communications cascade.
    pub fn delete_client(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM clients WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Client`].
fn row_to_client(row: &rusqlite::Row<'_>) -> rusqlite::Result<Client> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(7)?;

    Ok(Client {
        id: uuid_col(0, &id_str)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        address: row.get(5)?,
        notes: row.get(6)?,
        created_at: timestamp_col(7, &created_str)?,
    })
}
