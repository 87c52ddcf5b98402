//! Invoice handlers.  Totals are computed once at creation (`amount + tax`)
//! and stored; later status changes never recompute money.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use docket_store::{Invoice, InvoiceLineItem, InvoiceStatus, StoreError};

use crate::api::AppState;
use crate::audit::{AuditEvent, RequestMeta};
use crate::auth::AuthUser;
use crate::error::{ensure, ApiError, Json};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    client_id: Uuid,
    invoice_number: Option<String>,
    amount: f64,
    tax: Option<f64>,
    status: Option<InvoiceStatus>,
    due_date: Option<DateTime<Utc>>,
    line_items: Option<Vec<InvoiceLineItem>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceRequest {
    status: InvoiceStatus,
}

/// Invoice numbers look like `INV-20260825-1a2b3c` when the caller does not
/// supply one.
fn generate_invoice_number(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x1000000);
    format!("INV-{}-{suffix:06x}", now.format("%Y%m%d"))
}

/// GET /api/invoices
pub async fn list_invoices(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Invoice>>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_invoices()?))
}

/// POST /api/invoices
pub async fn create_invoice(
    auth: AuthUser,
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), ApiError> {
    ensure(req.amount >= 0.0, "invoice create: negative amount")?;
    let tax = req.tax.unwrap_or(0.0);
    ensure(tax >= 0.0, "invoice create: negative tax")?;
    if let Some(number) = &req.invoice_number {
        ensure(!number.trim().is_empty(), "invoice create: blank number")?;
    }

    let now = Utc::now();
    let invoice = Invoice {
        id: Uuid::new_v4(),
        client_id: req.client_id,
        invoice_number: req
            .invoice_number
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| generate_invoice_number(now)),
        amount: req.amount,
        tax,
        total_amount: req.amount + tax,
        status: req.status.unwrap_or(InvoiceStatus::Draft),
        due_date: req.due_date,
        paid_at: None,
        line_items: req.line_items.unwrap_or_default(),
        created_at: now,
    };

    {
        let db = state.db.lock().await;
        db.get_client(req.client_id).map_err(|e| match e {
            StoreError::NotFound => ApiError::Validation,
            other => ApiError::Store(other),
        })?;
        db.create_invoice(&invoice).map_err(|e| match e {
            StoreError::Duplicate => {
                ApiError::Conflict("An invoice with this number already exists".to_string())
            }
            other => ApiError::Store(other),
        })?;
    }

    info!(id = %invoice.id, number = %invoice.invoice_number, "invoice created");

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(auth.id),
                action: "invoice.create",
                resource_type: "invoice",
                resource_id: Some(invoice.id.to_string()),
                success: true,
                details: Some(json!({
                    "invoiceNumber": invoice.invoice_number,
                    "totalAmount": invoice.total_amount,
                })),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(invoice)))
}

/// GET /api/invoices/{id}
pub async fn get_invoice(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.get_invoice(id)?))
}

/// PUT /api/invoices/{id}
///
/// Status transitions only.  Entering `paid` stamps the payment time; any
/// other target status clears it.
pub async fn update_invoice(
    auth: AuthUser,
    State(state): State<AppState>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateInvoiceRequest>,
) -> Result<Json<Invoice>, ApiError> {
    let paid_at = match req.status {
        InvoiceStatus::Paid => Some(Utc::now()),
        _ => None,
    };

    let updated = {
        let db = state.db.lock().await;
        db.update_invoice_status(id, req.status, paid_at)?
    };

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(auth.id),
                action: "invoice.update",
                resource_type: "invoice",
                resource_id: Some(id.to_string()),
                success: true,
                details: Some(json!({ "status": updated.status.as_str() })),
            },
        )
        .await;

    Ok(Json(updated))
}
