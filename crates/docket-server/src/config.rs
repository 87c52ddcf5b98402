//! Server configuration loaded from environment variables.
//!
//! Operational settings (addresses, paths) have development defaults.  The
//! secrets do not: a missing or weak `JWT_SECRET` and a missing AI key are
//! startup failures, never silent fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Uploads larger than this are rejected before anything touches disk.
pub const MAX_UPLOAD_SIZE: usize = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET is required")]
    MissingJwtSecret,

    #[error("JWT_SECRET must be at least 32 characters, got {0}")]
    WeakJwtSecret(usize),

    #[error("XAI_API_KEY (or GROK_API_KEY) is required")]
    MissingAiKey,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3001`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database.
    /// Env: `DATABASE_PATH`
    /// Default: `./data/docket.db`
    pub database_path: PathBuf,

    /// Root directory for uploaded documents.
    /// Env: `UPLOAD_DIR`
    /// Default: `./uploads`
    pub upload_dir: PathBuf,

    /// HMAC secret for signing session tokens.  Required, minimum 32
    /// characters.
    /// Env: `JWT_SECRET`
    pub jwt_secret: String,

    /// SendGrid API key.  When absent, outgoing email is written to the
    /// server log instead of being delivered (development fallback).
    /// Env: `SENDGRID_API_KEY`
    pub sendgrid_api_key: Option<String>,

    /// Sender address for all outgoing email.
    /// Env: `FROM_EMAIL`
    /// Default: `noreply@sterlinglegal.example`
    pub from_email: String,

    /// Public base URL of the browser frontend, used to build portal links
    /// embedded in email.
    /// Env: `FRONTEND_URL`
    /// Default: `http://localhost:5173`
    pub frontend_url: String,

    /// API key for the Grok chat completions API.  Required.
    /// Env: `XAI_API_KEY`, with `GROK_API_KEY` accepted as an alias.
    pub ai_api_key: String,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Fails fast on missing secrets so a misconfigured deployment dies at
    /// startup instead of at the first request that needs the secret.
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingJwtSecret)?;
        validate_jwt_secret(&jwt_secret)?;

        let ai_api_key = resolve_ai_key(
            std::env::var("XAI_API_KEY").ok(),
            std::env::var("GROK_API_KEY").ok(),
        )?;

        let mut http_addr: SocketAddr = ([0, 0, 0, 0], 3001).into();
        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        let database_path = std::env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/docket.db"));

        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));

        let sendgrid_api_key = std::env::var("SENDGRID_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        let from_email = std::env::var("FROM_EMAIL")
            .unwrap_or_else(|_| "noreply@sterlinglegal.example".to_string());

        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        Ok(Self {
            http_addr,
            database_path,
            upload_dir,
            jwt_secret,
            sendgrid_api_key,
            from_email,
            frontend_url,
            ai_api_key,
        })
    }
}

/// Reject JWT secrets under 32 characters.  HS256 with a short secret is
/// brute-forceable, so this is a startup error rather than a warning.
fn validate_jwt_secret(secret: &str) -> Result<(), ConfigError> {
    let length = secret.chars().count();
    if length < 32 {
        return Err(ConfigError::WeakJwtSecret(length));
    }
    Ok(())
}

/// Resolve the chat API key; `XAI_API_KEY` wins over the `GROK_API_KEY`
/// alias, and neither being set is a startup error.
fn resolve_ai_key(
    primary: Option<String>,
    alias: Option<String>,
) -> Result<String, ConfigError> {
    primary.or(alias).ok_or(ConfigError::MissingAiKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_length_rule() {
        assert!(validate_jwt_secret("0123456789abcdef0123456789abcdef").is_ok());
        assert!(matches!(
            validate_jwt_secret("too-short"),
            Err(ConfigError::WeakJwtSecret(9))
        ));
        // Exactly 32 characters passes.
        assert!(validate_jwt_secret(&"x".repeat(32)).is_ok());
        // Characters, not bytes: 16 two-byte characters is still too short.
        assert!(matches!(
            validate_jwt_secret(&"é".repeat(16)),
            Err(ConfigError::WeakJwtSecret(16))
        ));
        assert!(validate_jwt_secret(&"é".repeat(32)).is_ok());
    }

    #[test]
    fn ai_key_rule() {
        assert_eq!(
            resolve_ai_key(Some("xai-k".into()), Some("grok-k".into())).unwrap(),
            "xai-k"
        );
        assert_eq!(resolve_ai_key(None, Some("grok-k".into())).unwrap(), "grok-k");
        assert!(matches!(
            resolve_ai_key(None, None),
            Err(ConfigError::MissingAiKey)
        ));
    }
}
