//! Case handlers.  Cases are never deleted; a matter ends by moving to the
//! closed status, and its rows stay behind for the record.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use docket_store::{Case, CaseStatus, StoreError};

use crate::api::AppState;
use crate::audit::{AuditEvent, RequestMeta};
use crate::auth::AuthUser;
use crate::error::{ensure, ApiError, Json};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCaseRequest {
    client_id: Uuid,
    title: String,
    case_type: String,
    status: Option<CaseStatus>,
    description: Option<String>,
    total_fees: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCaseRequest {
    title: Option<String>,
    case_type: Option<String>,
    status: Option<CaseStatus>,
    description: Option<String>,
    total_fees: Option<f64>,
}

/// GET /api/cases
pub async fn list_cases(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Case>>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_cases()?))
}

/// POST /api/cases
pub async fn create_case(
    auth: AuthUser,
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<CreateCaseRequest>,
) -> Result<(StatusCode, Json<Case>), ApiError> {
    ensure(!req.title.trim().is_empty(), "case create: empty title")?;
    ensure(!req.case_type.trim().is_empty(), "case create: empty case type")?;
    if let Some(fees) = req.total_fees {
        ensure(fees >= 0.0, "case create: negative fees")?;
    }

    let now = Utc::now();
    let case = Case {
        id: Uuid::new_v4(),
        client_id: req.client_id,
        title: req.title.trim().to_string(),
        case_type: req.case_type.trim().to_string(),
        status: req.status.unwrap_or(CaseStatus::Active),
        description: req.description,
        total_fees: req.total_fees.unwrap_or(0.0),
        created_at: now,
        updated_at: now,
    };

    {
        let db = state.db.lock().await;
        // The client must exist before the matter referencing it.
        db.get_client(req.client_id).map_err(|e| match e {
            StoreError::NotFound => ApiError::Validation,
            other => ApiError::Store(other),
        })?;
        db.create_case(&case)?;
    }

    info!(id = %case.id, client = %case.client_id, "case opened");

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(auth.id),
                action: "case.create",
                resource_type: "case",
                resource_id: Some(case.id.to_string()),
                success: true,
                details: Some(json!({
                    "title": case.title,
                    "caseType": case.case_type,
                })),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(case)))
}

/// GET /api/cases/{id}
pub async fn get_case(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Case>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.get_case(id)?))
}

/// PUT /api/cases/{id}
pub async fn update_case(
    auth: AuthUser,
    State(state): State<AppState>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCaseRequest>,
) -> Result<Json<Case>, ApiError> {
    let updated = {
        let db = state.db.lock().await;
        let mut case = db.get_case(id)?;

        if let Some(title) = req.title {
            ensure(!title.trim().is_empty(), "case update: empty title")?;
            case.title = title.trim().to_string();
        }
        if let Some(case_type) = req.case_type {
            ensure(!case_type.trim().is_empty(), "case update: empty case type")?;
            case.case_type = case_type.trim().to_string();
        }
        if let Some(status) = req.status {
            case.status = status;
        }
        if let Some(description) = req.description {
            case.description = Some(description);
        }
        if let Some(total_fees) = req.total_fees {
            ensure(total_fees >= 0.0, "case update: negative fees")?;
            case.total_fees = total_fees;
        }
        case.updated_at = Utc::now();

        db.update_case(&case)?;
        case
    };

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(auth.id),
                action: "case.update",
                resource_type: "case",
                resource_id: Some(id.to_string()),
                success: true,
                details: Some(json!({ "status": updated.status.as_str() })),
            },
        )
        .await;

    Ok(Json(updated))
}
