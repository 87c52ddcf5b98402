//! CRUD operations for [`Invoice`] records.
//!
//! Line items are stored denormalized as a JSON array inside the row; they
//! are only ever read or written as a unit alongside their invoice.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{enum_parse_err, timestamp_col, uuid_col, Invoice, InvoiceStatus};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new invoice.  Fails with [`StoreError::Duplicate`] if the
    /// invoice number is already taken.
    pub fn create_invoice(&self, invoice: &Invoice) -> Result<()> {
        let line_items = serde_json::to_string(&invoice.line_items)?;
        self.conn().execute(
            "INSERT INTO invoices (id, client_id, invoice_number, amount, tax, total_amount, status, due_date, paid_at, line_items, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                invoice.id.to_string(),
                invoice.client_id.to_string(),
                invoice.invoice_number,
                invoice.amount,
                invoice.tax,
                invoice.total_amount,
                invoice.status.as_str(),
                invoice.due_date.map(|d| d.to_rfc3339()),
                invoice.paid_at.map(|d| d.to_rfc3339()),
                line_items,
                invoice.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single invoice by UUID.
    pub fn get_invoice(&self, id: Uuid) -> Result<Invoice> {
        self.conn()
            .query_row(
                "SELECT id, client_id, invoice_number, amount, tax, total_amount, status, due_date, paid_at, line_items, created_at
                 FROM invoices
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_invoice,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all invoices, newest first.
    pub fn list_invoices(&self) -> Result<Vec<Invoice>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, client_id, invoice_number, amount, tax, total_amount, status, due_date, paid_at, line_items, created_at
             FROM invoices
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_invoice)?;

        let mut invoices = Vec::new();
        for row in rows {
            invoices.push(row?);
        }
        Ok(invoices)
    }

    /// List invoices for one client, newest first.
    pub fn list_invoices_for_client(&self, client_id: Uuid) -> Result<Vec<Invoice>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, client_id, invoice_number, amount, tax, total_amount, status, due_date, paid_at, line_items, created_at
             FROM invoices
             WHERE client_id = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![client_id.to_string()], row_to_invoice)?;

        let mut invoices = Vec::new();
        for row in rows {
            invoices.push(row?);
        }
        Ok(invoices)
    }

    /// Sum of totals across unpaid (sent or overdue) invoices.
    pub fn sum_outstanding_invoices(&self) -> Result<f64> {
        let total = self.conn().query_row(
            "SELECT COALESCE(SUM(total_amount), 0)
             FROM invoices
             WHERE status IN ('sent', 'overdue')",
            [],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Move an invoice to a new status, stamping `paid_at` when provided.
    pub fn update_invoice_status(
        &self,
        id: Uuid,
        status: InvoiceStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Invoice> {
        let affected = self.conn().execute(
            "UPDATE invoices SET status = ?2, paid_at = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                status.as_str(),
                paid_at.map(|d| d.to_rfc3339()),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_invoice(id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to an [`Invoice`].
fn row_to_invoice(row: &rusqlite::Row<'_>) -> rusqlite::Result<Invoice> {
    let id_str: String = row.get(0)?;
    let client_id_str: String = row.get(1)?;
    let status_str: String = row.get(6)?;
    let due_str: Option<String> = row.get(7)?;
    let paid_str: Option<String> = row.get(8)?;
    let line_items_json: String = row.get(9)?;
    let created_str: String = row.get(10)?;

    let status =
        InvoiceStatus::parse(&status_str).ok_or_else(|| enum_parse_err(6, &status_str))?;

    let due_date = match due_str {
        Some(s) => Some(timestamp_col(7, &s)?),
        None => None,
    };
    let paid_at = match paid_str {
        Some(s) => Some(timestamp_col(8, &s)?),
        None => None,
    };

    let line_items = serde_json::from_str(&line_items_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Invoice {
        id: uuid_col(0, &id_str)?,
        client_id: uuid_col(1, &client_id_str)?,
        invoice_number: row.get(2)?,
        amount: row.get(3)?,
        tax: row.get(4)?,
        total_amount: row.get(5)?,
        status,
        due_date,
        paid_at,
        line_items,
        created_at: timestamp_col(10, &created_str)?,
    })
}
