//! # docket-store
//!
//! Relational persistence for the Docket practice-management backend,
//! backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model: users, clients, cases, consultations, invoices, document metadata,
//! portal access tokens, communications, AI chat sessions, and audit logs.
//! Schema migrations run automatically when the database is opened.

pub mod audit;
pub mod cases;
pub mod chat_sessions;
pub mod clients;
pub mod communications;
pub mod consultations;
pub mod database;
pub mod documents;
pub mod invoices;
pub mod migrations;
pub mod models;
pub mod tokens;
pub mod users;

mod error;

pub use audit::AuditLogFilter;
pub use database::Database;
pub use documents::DocumentFilter;
pub use error::StoreError;
pub use models::*;
