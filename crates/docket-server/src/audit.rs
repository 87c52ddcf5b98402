//! Append-only audit trail with automatic redaction.
//!
//! Every privileged or externally-visible action records an entry.  Detail
//! payloads are sanitized before persistence: any key that contains one of
//! the sensitive substrings, at any nesting depth, has its value replaced by
//! the redaction marker.  Audit failures never fail the request they
//! describe; they are logged and dropped.

use std::convert::Infallible;
use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use docket_store::{AuditLog, AuditLogFilter, Database};

use crate::api::AppState;
use crate::auth::AdminUser;
use crate::error::ApiError;

/// Value written in place of a sensitive field.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Key substrings (compared lowercase) whose values must never be persisted.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "authorization",
    "cookie",
    "ssn",
    "creditcard",
    "cvv",
    "secret",
    "apikey",
    "authtoken",
    "accesstoken",
    "refreshtoken",
];

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|needle| lower.contains(needle))
}

/// Replace sensitive values in-place, recursing through objects and arrays.
/// Sibling keys are left untouched.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if is_sensitive(key) {
                    *val = Value::String(REDACTION_MARKER.to_string());
                } else {
                    redact(val);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact(item);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Request metadata
// ---------------------------------------------------------------------------

/// Client address and user agent of the request being audited.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = client_ip(parts).map(|ip| ip.to_string());
        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        Ok(Self { ip, user_agent })
    }
}

/// Try ConnectInfo first, then the usual proxy headers.
fn client_ip(parts: &Parts) -> Option<IpAddr> {
    if let Some(connect_info) = parts.extensions.get::<ConnectInfo<std::net::SocketAddr>>() {
        return Some(connect_info.0.ip());
    }

    for header in ["x-forwarded-for", "x-real-ip"] {
        if let Some(value) = parts.headers.get(header).and_then(|v| v.to_str().ok()) {
            if let Some(first) = value.split(',').next() {
                if let Ok(ip) = first.trim().parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// One action to be recorded.
pub struct AuditEvent<'a> {
    pub user_id: Option<Uuid>,
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: Option<String>,
    pub success: bool,
    pub details: Option<Value>,
}

/// Writes audit entries through the shared database handle.
#[derive(Clone)]
pub struct AuditRecorder {
    db: Arc<Mutex<Database>>,
}

impl AuditRecorder {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Record one event.  Detail values are redacted before the row is
    /// written.  A failed insert is logged and otherwise ignored.
    pub async fn record(&self, meta: &RequestMeta, event: AuditEvent<'_>) {
        let details = event.details.map(|mut value| {
            redact(&mut value);
            value
        });

        let entry = AuditLog {
            id: Uuid::new_v4(),
            user_id: event.user_id,
            action: event.action.to_string(),
            resource_type: event.resource_type.to_string(),
            resource_id: event.resource_id,
            status: if event.success { "success" } else { "failure" }.to_string(),
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            details,
            created_at: Utc::now(),
        };

        let db = self.db.lock().await;
        if let Err(e) = db.insert_audit_log(&entry) {
            warn!(error = %e, action = %entry.action, "failed to write audit log entry");
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
    user_id: Option<Uuid>,
    resource_type: Option<String>,
    resource_id: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// GET /api/audit-logs
pub async fn list_audit_logs(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Vec<AuditLog>>, ApiError> {
    let limit = query.limit.min(500);
    let filter = AuditLogFilter {
        user_id: query.user_id,
        resource_type: query.resource_type,
        resource_id: query.resource_id,
    };
    let db = state.db.lock().await;
    let entries = db.list_audit_logs(&filter, limit, query.offset)?;
    Ok(Json(entries))
}
