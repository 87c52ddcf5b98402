//! CRUD operations for [`User`] accounts.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{enum_parse_err, timestamp_col, uuid_col, User, UserRole};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user.  Fails with [`StoreError::Duplicate`] if the email
    /// is already registered.
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, email, password_hash, role, profile_photo, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id.to_string(),
                user.email,
                user.password_hash,
                user.role.as_str(),
                user.profile_photo,
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single user by UUID.
    pub fn get_user(&self, id: Uuid) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, email, password_hash, role, profile_photo, created_at
                 FROM users
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch a single user by email, for login.
    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, email, password_hash, role, profile_photo, created_at
                 FROM users
                 WHERE email = ?1",
                params![email],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Update a user's own profile fields and return the fresh row.
    pub fn update_user_profile(
        &self,
        id: Uuid,
        email: &str,
        profile_photo: Option<&str>,
    ) -> Result<User> {
        let affected = self.conn().execute(
            "UPDATE users SET email = ?2, profile_photo = ?3 WHERE id = ?1",
            params![id.to_string(), email, profile_photo],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_user(id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let email: String = row.get(1)?;
    let password_hash: String = row.get(2)?;
    let role_str: String = row.get(3)?;
    let profile_photo: Option<String> = row.get(4)?;
    let created_str: String = row.get(5)?;

    let role = UserRole::parse(&role_str).ok_or_else(|| enum_parse_err(3, &role_str))?;

    Ok(User {
        id: uuid_col(0, &id_str)?,
        email,
        password_hash,
        role,
        profile_photo,
        created_at: timestamp_col(5, &created_str)?,
    })
}
