//! Authentication: password accounts, signed session tokens, and the
//! extractors that gate protected routes.
//!
//! Tokens are JWTs signed with HS256 and a shared secret (24h lifetime).
//! Two gates exist: [`AuthUser`] proves a valid token, [`AdminUser`]
//! additionally loads the account and checks its role.  The distinction
//! matters for the error codes: a missing credential is 401
//! "Authentication required", a bad one is 401 "Invalid token", and a role
//! mismatch is 403.

use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use docket_store::{StoreError, User, UserRole};

use crate::api::AppState;
use crate::audit::{AuditEvent, RequestMeta};
use crate::error::{ensure, ApiError, Json};

/// Session token lifetime.
const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User UUID.
    pub sub: String,
    /// Expiry as a unix timestamp.
    pub exp: usize,
}

/// Sign a session token for a user id.
pub fn create_jwt(user_id: Uuid, secret: &str) -> Result<String, ApiError> {
    let expiration = Utc::now() + Duration::hours(TOKEN_TTL_HOURS);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))
}

/// Verify a session token and return its claims.  Expiry is enforced.
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// A request carrying a valid session token.
pub struct AuthUser {
    pub id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;

        let claims =
            validate_jwt(token, &state.config.jwt_secret).map_err(|_| ApiError::InvalidToken)?;
        let id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::InvalidToken)?;

        Ok(AuthUser { id })
    }
}

/// A request from an authenticated user whose account holds the admin role.
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;

        let user = {
            let db = state.db.lock().await;
            db.get_user(auth.id)
        }
        .map_err(|e| match e {
            // A token for a deleted account no longer identifies anyone.
            StoreError::NotFound => ApiError::InvalidToken,
            other => ApiError::Store(other),
        })?;

        if user.role != UserRole::Admin {
            return Err(ApiError::Forbidden);
        }

        Ok(AdminUser(user))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    email: Option<String>,
    profile_photo: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    token: String,
    user: User,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn valid_email(email: &str) -> bool {
    let at = match email.find('@') {
        Some(i) => i,
        None => return false,
    };
    at > 0 && email[at + 1..].contains('.') && !email.ends_with('.')
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let email = normalize_email(&req.email);
    ensure(valid_email(&email), "register: malformed email")?;
    ensure(req.password.len() >= 8, "register: password under 8 chars")?;

    let password_hash = hash(&req.password, DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("bcrypt failure: {e}")))?;

    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash,
        role: UserRole::Admin,
        profile_photo: None,
        created_at: Utc::now(),
    };

    {
        let db = state.db.lock().await;
        db.create_user(&user).map_err(|e| match e {
            StoreError::Duplicate => {
                ApiError::Conflict("An account with this email already exists".to_string())
            }
            other => ApiError::Store(other),
        })?;
    }

    let token = create_jwt(user.id, &state.config.jwt_secret)?;

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(user.id),
                action: "auth.register",
                resource_type: "user",
                resource_id: Some(user.id.to_string()),
                success: true,
                details: Some(json!({ "email": user.email })),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = normalize_email(&req.email);

    let user = {
        let db = state.db.lock().await;
        db.get_user_by_email(&email)
    };

    let user = match user {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            record_login_failure(&state, &meta, &email).await;
            return Err(ApiError::InvalidCredentials);
        }
        Err(other) => return Err(ApiError::Store(other)),
    };

    if !verify(&req.password, &user.password_hash).unwrap_or(false) {
        record_login_failure(&state, &meta, &email).await;
        return Err(ApiError::InvalidCredentials);
    }

    let token = create_jwt(user.id, &state.config.jwt_secret)?;

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(user.id),
                action: "auth.login",
                resource_type: "user",
                resource_id: Some(user.id.to_string()),
                success: true,
                details: None,
            },
        )
        .await;

    Ok(Json(AuthResponse { token, user }))
}

async fn record_login_failure(state: &AppState, meta: &RequestMeta, email: &str) {
    state
        .audit
        .record(
            meta,
            AuditEvent {
                user_id: None,
                action: "auth.login",
                resource_type: "user",
                resource_id: None,
                success: false,
                details: Some(json!({ "email": email })),
            },
        )
        .await;
}

/// GET /api/auth/user and GET /api/auth/profile
pub async fn current_user(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, ApiError> {
    let db = state.db.lock().await;
    let user = db.get_user(auth.id).map_err(|e| match e {
        StoreError::NotFound => ApiError::InvalidToken,
        other => ApiError::Store(other),
    })?;
    Ok(Json(user))
}

/// PUT /api/auth/user and PUT /api/auth/profile
pub async fn update_profile(
    auth: AuthUser,
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let db = state.db.lock().await;
    let current = db.get_user(auth.id).map_err(|e| match e {
        StoreError::NotFound => ApiError::InvalidToken,
        other => ApiError::Store(other),
    })?;

    let email = match req.email {
        Some(raw) => {
            let email = normalize_email(&raw);
            ensure(valid_email(&email), "profile: malformed email")?;
            email
        }
        None => current.email,
    };
    let profile_photo = req.profile_photo.or(current.profile_photo);

    let updated = db
        .update_user_profile(auth.id, &email, profile_photo.as_deref())
        .map_err(|e| match e {
            StoreError::Duplicate => {
                ApiError::Conflict("An account with this email already exists".to_string())
            }
            other => ApiError::Store(other),
        })?;
    drop(db);

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(auth.id),
                action: "auth.profile_update",
                resource_type: "user",
                resource_id: Some(auth.id.to_string()),
                success: true,
                details: Some(json!({ "email": updated.email })),
            },
        )
        .await;

    Ok(Json(updated))
}
