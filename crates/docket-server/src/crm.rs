//! Client and consultation handlers, the public intake endpoints, search,
//! and the dashboard summary.
//!
//! Two endpoints here are deliberately unauthenticated: client creation and
//! consultation booking both back the public website's forms.  Booking
//! auto-creates the client row when the email is new, so a first-time
//! visitor books in one request.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use docket_store::{
    Case, CaseStatus, Client, Communication, CommunicationDirection, CommunicationStatus,
    Consultation, ConsultationKind, ConsultationStatus, Database, StoreError,
};

use crate::api::AppState;
use crate::audit::{AuditEvent, RequestMeta};
use crate::auth::{normalize_email, valid_email, AuthUser};
use crate::error::{ensure, ApiError, Json};

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    address: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    notes: Option<String>,
}

/// GET /api/clients
pub async fn list_clients(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Client>>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_clients()?))
}

/// POST /api/clients
///
/// Public so the website intake form can create a record without a login.
pub async fn create_client(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), ApiError> {
    let email = normalize_email(&req.email);
    ensure(valid_email(&email), "client create: malformed email")?;
    ensure(!req.first_name.trim().is_empty(), "client create: empty first name")?;
    ensure(!req.last_name.trim().is_empty(), "client create: empty last name")?;

    let client = Client {
        id: Uuid::new_v4(),
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        email,
        phone: req.phone,
        address: req.address,
        notes: req.notes,
        created_at: Utc::now(),
    };

    {
        let db = state.db.lock().await;
        db.create_client(&client).map_err(|e| match e {
            StoreError::Duplicate => {
                ApiError::Conflict("A client with this email already exists".to_string())
            }
            other => ApiError::Store(other),
        })?;
    }

    info!(id = %client.id, "client created");

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: None,
                action: "client.create",
                resource_type: "client",
                resource_id: Some(client.id.to_string()),
                success: true,
                details: Some(json!({ "email": client.email })),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(client)))
}

/// GET /api/clients/{id}
pub async fn get_client(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.get_client(id)?))
}

/// PUT /api/clients/{id}
pub async fn update_client(
    auth: AuthUser,
    State(state): State<AppState>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateClientRequest>,
) -> Result<Json<Client>, ApiError> {
    let updated = {
        let db = state.db.lock().await;
        let mut client = db.get_client(id)?;

        if let Some(first_name) = req.first_name {
            ensure(!first_name.trim().is_empty(), "client update: empty first name")?;
            client.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = req.last_name {
            ensure(!last_name.trim().is_empty(), "client update: empty last name")?;
            client.last_name = last_name.trim().to_string();
        }
        if let Some(email) = req.email {
            let email = normalize_email(&email);
            ensure(valid_email(&email), "client update: malformed email")?;
            client.email = email;
        }
        if let Some(phone) = req.phone {
            client.phone = Some(phone);
        }
        if let Some(address) = req.address {
            client.address = Some(address);
        }
        if let Some(notes) = req.notes {
            client.notes = Some(notes);
        }

        db.update_client(&client).map_err(|e| match e {
            StoreError::Duplicate => {
                ApiError::Conflict("A client with this email already exists".to_string())
            }
            other => ApiError::Store(other),
        })?;
        client
    };

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(auth.id),
                action: "client.update",
                resource_type: "client",
                resource_id: Some(id.to_string()),
                success: true,
                details: None,
            },
        )
        .await;

    Ok(Json(updated))
}

/// GET /api/clients/{id}/communications
pub async fn client_communications(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Communication>>, ApiError> {
    let db = state.db.lock().await;
    // 404 for an unknown client rather than an empty list.
    db.get_client(id)?;
    Ok(Json(db.list_communications_for_client(id)?))
}

// ---------------------------------------------------------------------------
// Consultations
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookConsultationRequest {
    client_email: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    #[serde(rename = "type")]
    kind: ConsultationKind,
    case_type: String,
    scheduled_at: DateTime<Utc>,
    rate: Option<f64>,
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConsultationRequest {
    #[serde(rename = "type")]
    kind: Option<ConsultationKind>,
    case_type: Option<String>,
    scheduled_at: Option<DateTime<Utc>>,
    status: Option<ConsultationStatus>,
    rate: Option<f64>,
    description: Option<String>,
}

/// GET /api/consultations
pub async fn list_consultations(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Consultation>>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_consultations()?))
}

/// POST /api/consultations
///
/// Public booking.  An unknown email creates the client row in the same
/// request; the confirmation email is attempted afterwards and its failure
/// never fails the booking.
pub async fn book_consultation(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<BookConsultationRequest>,
) -> Result<(StatusCode, Json<Consultation>), ApiError> {
    let email = normalize_email(&req.client_email);
    ensure(valid_email(&email), "booking: malformed email")?;
    ensure(!req.first_name.trim().is_empty(), "booking: empty first name")?;
    ensure(!req.last_name.trim().is_empty(), "booking: empty last name")?;
    ensure(!req.case_type.trim().is_empty(), "booking: empty case type")?;

    let consultation = {
        let db = state.db.lock().await;
        let client = find_or_create_client(
            &db,
            &email,
            req.first_name.trim(),
            req.last_name.trim(),
            req.phone.as_deref(),
        )?;

        let consultation = Consultation {
            id: Uuid::new_v4(),
            client_id: client.id,
            kind: req.kind,
            case_type: req.case_type.trim().to_string(),
            scheduled_at: req.scheduled_at,
            status: ConsultationStatus::Scheduled,
            rate: req.rate,
            description: req.description,
            created_at: Utc::now(),
        };
        db.create_consultation(&consultation)?;
        consultation
    };

    info!(id = %consultation.id, "consultation booked");

    // Confirmation is best-effort.  The booking stands either way, and the
    // outcome lands in the communication history.
    let subject = "Consultation Confirmed - Sterling & Associates";
    let body = format!(
        "<p>Your {} consultation is confirmed for {}.</p>\
         <p>We will reach out beforehand if anything needs to change.</p>",
        consultation.kind.as_str(),
        consultation.scheduled_at.format("%B %e, %Y at %H:%M UTC"),
    );
    let outcome = state.mailer.send(&email, subject, &body).await;
    if !outcome.is_delivered() {
        warn!(consultation = %consultation.id, "confirmation email failed");
    }
    record_email_outcome(
        &state,
        consultation.client_id,
        subject,
        &body,
        outcome.is_delivered(),
    )
    .await;

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: None,
                action: "consultation.book",
                resource_type: "consultation",
                resource_id: Some(consultation.id.to_string()),
                success: true,
                details: Some(json!({
                    "email": email,
                    "type": consultation.kind.as_str(),
                    "scheduledAt": consultation.scheduled_at.to_rfc3339(),
                })),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(consultation)))
}

/// GET /api/consultations/{id}
pub async fn get_consultation(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Consultation>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.get_consultation(id)?))
}

/// PUT /api/consultations/{id}
pub async fn update_consultation(
    auth: AuthUser,
    State(state): State<AppState>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateConsultationRequest>,
) -> Result<Json<Consultation>, ApiError> {
    let updated = {
        let db = state.db.lock().await;
        let mut consultation = db.get_consultation(id)?;

        if let Some(kind) = req.kind {
            consultation.kind = kind;
        }
        if let Some(case_type) = req.case_type {
            ensure(!case_type.trim().is_empty(), "consultation update: empty case type")?;
            consultation.case_type = case_type.trim().to_string();
        }
        if let Some(scheduled_at) = req.scheduled_at {
            consultation.scheduled_at = scheduled_at;
        }
        if let Some(status) = req.status {
            consultation.status = status;
        }
        if let Some(rate) = req.rate {
            consultation.rate = Some(rate);
        }
        if let Some(description) = req.description {
            consultation.description = Some(description);
        }

        db.update_consultation(&consultation)?;
        consultation
    };

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(auth.id),
                action: "consultation.update",
                resource_type: "consultation",
                resource_id: Some(id.to_string()),
                success: true,
                details: Some(json!({ "status": updated.status.as_str() })),
            },
        )
        .await;

    Ok(Json(updated))
}

// ---------------------------------------------------------------------------
// Contact form
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    subject: Option<String>,
    message: String,
}

/// POST /api/contact
///
/// Public contact form.  The message lands in the sender's communication
/// history; an unknown email creates the client row first.
pub async fn submit_contact(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<ContactRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let email = normalize_email(&req.email);
    ensure(valid_email(&email), "contact: malformed email")?;
    ensure(!req.first_name.trim().is_empty(), "contact: empty first name")?;
    ensure(!req.last_name.trim().is_empty(), "contact: empty last name")?;
    ensure(!req.message.trim().is_empty(), "contact: empty message")?;

    let subject = req
        .subject
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Website inquiry".to_string());

    let client_id = {
        let db = state.db.lock().await;
        let client = find_or_create_client(
            &db,
            &email,
            req.first_name.trim(),
            req.last_name.trim(),
            req.phone.as_deref(),
        )?;

        let inbound = Communication {
            id: Uuid::new_v4(),
            client_id: client.id,
            direction: CommunicationDirection::Inbound,
            channel: "contact-form".to_string(),
            subject: subject.clone(),
            body: req.message.trim().to_string(),
            status: CommunicationStatus::Received,
            created_at: Utc::now(),
        };
        db.insert_communication(&inbound)?;
        client.id
    };

    let ack_subject = "We received your message - Sterling & Associates";
    let ack_body = format!(
        "<p>Thank you for contacting Sterling &amp; Associates regarding \
         \"{subject}\".</p><p>A member of our team will respond within one \
         business day.</p>"
    );
    let outcome = state.mailer.send(&email, ack_subject, &ack_body).await;
    if !outcome.is_delivered() {
        warn!(client = %client_id, "contact acknowledgement email failed");
    }
    record_email_outcome(&state, client_id, ack_subject, &ack_body, outcome.is_delivered()).await;

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: None,
                action: "contact.submit",
                resource_type: "communication",
                resource_id: Some(client_id.to_string()),
                success: true,
                details: Some(json!({ "email": email, "subject": subject })),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(json!({ "received": true }))))
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
}

/// GET /api/search/clients
pub async fn search_clients(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Client>>, ApiError> {
    let term = query.q.trim();
    ensure(!term.is_empty(), "search: empty query")?;
    let db = state.db.lock().await;
    Ok(Json(db.search_clients(term)?))
}

/// GET /api/search/cases
pub async fn search_cases(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Case>>, ApiError> {
    let term = query.q.trim();
    ensure(!term.is_empty(), "search: empty query")?;
    let db = state.db.lock().await;
    Ok(Json(db.search_cases(term)?))
}

/// GET /api/search/consultations
pub async fn search_consultations(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Consultation>>, ApiError> {
    let term = query.q.trim();
    ensure(!term.is_empty(), "search: empty query")?;
    let db = state.db.lock().await;
    Ok(Json(db.search_consultations(term)?))
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    total_clients: i64,
    active_cases: i64,
    scheduled_consultations: i64,
    outstanding_balance: f64,
}

/// GET /api/dashboard/stats
pub async fn dashboard_stats(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, ApiError> {
    let db = state.db.lock().await;
    let stats = DashboardStats {
        total_clients: db.count_clients()?,
        active_cases: db.count_cases_with_status(CaseStatus::Active)?,
        scheduled_consultations: db
            .count_consultations_with_status(ConsultationStatus::Scheduled)?,
        outstanding_balance: db.sum_outstanding_invoices()?,
    };
    Ok(Json(stats))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Look up a client by email, creating the row when absent.  Callers hold
/// the database lock.
fn find_or_create_client(
    db: &Database,
    email: &str,
    first_name: &str,
    last_name: &str,
    phone: Option<&str>,
) -> Result<Client, ApiError> {
    match db.get_client_by_email(email) {
        Ok(client) => Ok(client),
        Err(StoreError::NotFound) => {
            let client = Client {
                id: Uuid::new_v4(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: email.to_string(),
                phone: phone.map(|p| p.to_string()),
                address: None,
                notes: None,
                created_at: Utc::now(),
            };
            db.create_client(&client)?;
            info!(id = %client.id, "client auto-created from public form");
            Ok(client)
        }
        Err(other) => Err(ApiError::Store(other)),
    }
}

/// Append an outbound email attempt to the client's communication history.
/// History writes never fail the request that triggered them.
async fn record_email_outcome(
    state: &AppState,
    client_id: Uuid,
    subject: &str,
    body: &str,
    delivered: bool,
) {
    let communication = Communication {
        id: Uuid::new_v4(),
        client_id,
        direction: CommunicationDirection::Outbound,
        channel: "email".to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        status: if delivered {
            CommunicationStatus::Sent
        } else {
            CommunicationStatus::Failed
        },
        created_at: Utc::now(),
    };

    let db = state.db.lock().await;
    if let Err(e) = db.insert_communication(&communication) {
        warn!(client = %client_id, error = %e, "failed to record outbound email");
    }
}
