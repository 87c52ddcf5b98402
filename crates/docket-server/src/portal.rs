//! Client portal: opaque access tokens issued by email, resolved to a
//! read-only snapshot of the client's records.
//!
//! The token value travels over exactly one channel.  It is generated here,
//! stored, embedded in the access email, and never placed in an API
//! response.  When delivery fails the request fails too; the orphaned row
//! simply ages out through the sweep.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use chrono::{Duration as ChronoDuration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use docket_store::{
    Case, Client, ClientToken, Consultation, Database, Invoice, StoreError,
};

use crate::api::AppState;
use crate::audit::{AuditEvent, RequestMeta};
use crate::auth::{normalize_email, valid_email, AdminUser};
use crate::error::{ensure, ApiError, Json};

/// Portal tokens live this long.  There is no revocation; expiry is the only
/// way a token dies early of natural causes.
const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    email: String,
}

/// Everything a portal visitor may see, in one response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalSnapshot {
    client: Client,
    cases: Vec<Case>,
    consultations: Vec<Consultation>,
    invoices: Vec<Invoice>,
}

/// 32 random bytes, hex-encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// POST /api/client-portal/access
pub async fn request_access(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<AccessRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let email = normalize_email(&req.email);
    ensure(valid_email(&email), "portal access: malformed email")?;

    let (client, token) = {
        let db = state.db.lock().await;
        let client = db.get_client_by_email(&email).map_err(|e| match e {
            StoreError::NotFound => ApiError::NotFound("Client"),
            other => ApiError::Store(other),
        })?;

        let token = ClientToken {
            id: Uuid::new_v4(),
            client_id: client.id,
            token: generate_token(),
            expires_at: Utc::now() + ChronoDuration::hours(TOKEN_TTL_HOURS),
            created_at: Utc::now(),
        };
        db.insert_client_token(&token)?;
        (client, token)
    };

    let link = format!("{}/portal/{}", state.config.frontend_url, token.token);
    let subject = "Your secure portal link - Sterling & Associates";
    let body = format!(
        "<p>Hello {},</p>\
         <p>Use the link below to view your cases, consultations and \
         invoices. It is valid for 24 hours.</p>\
         <p><a href=\"{link}\">{link}</a></p>\
         <p>If you did not request this link, you can ignore this email.</p>",
        client.first_name,
    );

    let outcome = state.mailer.send(&email, subject, &body).await;
    if !outcome.is_delivered() {
        // The token stays in the database and is swept at expiry.  What
        // matters is that its value never leaves through this response.
        warn!(client = %client.id, "portal access email failed; token withheld");
        state
            .audit
            .record(
                &meta,
                AuditEvent {
                    user_id: None,
                    action: "portal.access_request",
                    resource_type: "client_token",
                    resource_id: Some(token.id.to_string()),
                    success: false,
                    details: Some(json!({ "email": email })),
                },
            )
            .await;
        return Err(ApiError::AccessEmailFailed);
    }

    info!(client = %client.id, "portal access link issued");

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: None,
                action: "portal.access_request",
                resource_type: "client_token",
                resource_id: Some(token.id.to_string()),
                success: true,
                details: Some(json!({ "email": email })),
            },
        )
        .await;

    Ok(Json(json!({
        "message": "An access link has been sent to your email address"
    })))
}

/// GET /api/client-portal/{token}
pub async fn resolve_access(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PortalSnapshot>, ApiError> {
    let db = state.db.lock().await;
    let row = db
        .get_valid_token(&token, Utc::now())
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::PortalTokenInvalid,
            other => ApiError::Store(other),
        })?;

    let snapshot = PortalSnapshot {
        client: db.get_client(row.client_id)?,
        cases: db.list_cases_for_client(row.client_id)?,
        consultations: db.list_consultations_for_client(row.client_id)?,
        invoices: db.list_invoices_for_client(row.client_id)?,
    };

    Ok(Json(snapshot))
}

/// POST /api/admin/cleanup-tokens
pub async fn cleanup_tokens(
    admin: AdminUser,
    State(state): State<AppState>,
    meta: RequestMeta,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = {
        let db = state.db.lock().await;
        db.delete_expired_tokens(Utc::now())?
    };

    info!(deleted, "expired portal tokens removed on demand");

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(admin.0.id),
                action: "tokens.cleanup",
                resource_type: "client_token",
                resource_id: None,
                success: true,
                details: Some(json!({ "deleted": deleted })),
            },
        )
        .await;

    Ok(Json(json!({ "deleted": deleted })))
}

/// Hourly sweep of expired portal tokens.  Housekeeping only; expired rows
/// are already invisible to lookups.
pub fn spawn_token_sweep(
    db: Arc<Mutex<Database>>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let swept = {
                let db = db.lock().await;
                db.delete_expired_tokens(Utc::now())
            };
            match swept {
                Ok(0) => {}
                Ok(n) => info!(swept = n, "expired portal tokens removed"),
                Err(e) => warn!(error = %e, "token sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_do_not_repeat() {
        // Statistically: 256 bits of randomness.
        assert_ne!(generate_token(), generate_token());
    }
}
