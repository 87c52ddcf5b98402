use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// An INSERT or UPDATE violated a UNIQUE constraint (e.g. a duplicate
    /// client email or invoice number).
    #[error("A record with the same unique value already exists")]
    Duplicate,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error for columns stored as JSON text
    /// (invoice line items, chat messages, audit details).
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    /// UNIQUE constraint violations are surfaced as [`StoreError::Duplicate`]
    /// so the API layer can answer 409 instead of a generic 500.
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(inner, _) = &e {
            if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return StoreError::Duplicate;
            }
        }
        StoreError::Sqlite(e)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
