use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use docket_store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No credential, or a credential that failed verification.
    #[error("Authentication required")]
    Unauthorized,

    /// A credential was presented but is expired or malformed.
    #[error("Invalid token")]
    InvalidToken,

    /// Login with a wrong email or password.  Deliberately does not say
    /// which half was wrong.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Authenticated, but the role does not allow this operation.
    #[error("Admin access required")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Request body failed validation.  The detail is logged server-side;
    /// clients only ever see the generic message.
    #[error("Invalid data")]
    Validation,

    /// Malformed request outside schema validation (bad multipart, bad id).
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },

    /// The portal access email could not be delivered.  Unlike every other
    /// email in the system this one is fatal, because the token must never
    /// travel over any channel except email.
    #[error("Failed to deliver access email")]
    AccessEmailFailed,

    /// A portal token that does not exist or has passed its expiry.  The
    /// two cases are indistinguishable to the caller on purpose.
    #[error("Invalid or expired access link")]
    PortalTokenInvalid,

    /// An external collaborator (LLM API) failed or answered garbage.
    #[error("Assistant unavailable: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Check one request validation rule.  The broken rule is logged for
/// operators; the client sees only the generic 400 message.
pub fn ensure(cond: bool, rule: &'static str) -> Result<(), ApiError> {
    if cond {
        Ok(())
    } else {
        tracing::debug!(rule, "request validation failed");
        Err(ApiError::Validation)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Validation => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ApiError::AccessEmailFailed => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::PortalTokenInvalid => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::Storage(_) => {
                tracing::error!(error = %self, "document storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Document storage error".to_string(),
                )
            }
            ApiError::Store(StoreError::NotFound) => {
                (StatusCode::NOT_FOUND, "Record not found".to_string())
            }
            ApiError::Store(StoreError::Duplicate) => (
                StatusCode::CONFLICT,
                "A record with the same unique value already exists".to_string(),
            ),
            ApiError::Store(e) => {
                tracing::error!(error = %e, "database failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Drop-in for [`axum::Json`].  Identical for responses, but a request body
/// that fails to deserialize maps to [`ApiError::Validation`] instead of
/// axum's 422: the serde detail is logged, never surfaced to the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "request body rejected");
                Err(ApiError::Validation)
            }
        }
    }
}

impl<T> IntoResponse for Json<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}
