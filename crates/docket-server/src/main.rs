//! # docket-server
//!
//! HTTP backend for the Sterling & Associates site and CRM.
//!
//! This binary provides:
//! - **REST API** (axum) for clients, cases, consultations, invoices and
//!   documents, with JWT-authenticated admin routes
//! - **Client portal** reached through emailed 24-hour access links
//! - **Document storage** on the local filesystem with metadata in SQLite
//! - **Audit logging** of administrative actions with field redaction
//! - **Email and AI integrations** (SendGrid, Grok) behind thin clients
//! - **Per-IP rate limiting** to protect against abuse

mod ai;
mod api;
mod audit;
mod auth;
mod billing;
mod cases;
mod config;
mod crm;
mod documents;
mod error;
mod mailer;
mod portal;
mod rate_limit;
#[cfg(test)]
mod testutil;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use docket_store::Database;

use crate::ai::AiClient;
use crate::api::AppState;
use crate::audit::AuditRecorder;
use crate::config::{ServerConfig, MAX_UPLOAD_SIZE};
use crate::documents::{DocumentStore, Reconciler};
use crate::mailer::Mailer;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,docket_server=debug")),
        )
        .init();

    info!("Starting docket server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration (fails fast on missing/weak secrets)
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env()?;
    info!(
        addr = %config.http_addr,
        database = %config.database_path.display(),
        uploads = %config.upload_dir.display(),
        email_delivery = config.sendgrid_api_key.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // SQLite database (creates parent directories and runs migrations)
    let db = Arc::new(Mutex::new(Database::open_at(&config.database_path)?));

    // Document store (creates upload directory if missing)
    let document_store =
        Arc::new(DocumentStore::new(config.upload_dir.clone(), MAX_UPLOAD_SIZE).await?);

    // Outbound email; degrades to log-only without an API key
    let mailer = Arc::new(Mailer::new(
        config.sendgrid_api_key.clone(),
        config.from_email.clone(),
    ));

    // AI assistant client
    let ai = Arc::new(AiClient::new(config.ai_api_key.clone()));

    // Rate limiter: 120 requests per minute per IP
    let rate_limiter = RateLimiter::default();

    // Audit trail and the orphaned-blob retry queue
    let audit = AuditRecorder::new(db.clone());
    let reconciler = Reconciler::new();

    let app_state = AppState {
        db: db.clone(),
        documents: document_store.clone(),
        mailer,
        ai,
        audit,
        reconciler: reconciler.clone(),
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Hourly sweep of expired portal tokens
    portal::spawn_token_sweep(db, Duration::from_secs(3600));

    // Orphaned blob retries (every 5 minutes)
    documents::spawn_reconciler(reconciler, document_store, Duration::from_secs(300));

    // Periodic rate limiter cleanup (every 5 minutes, evict idle IPs)
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    let http_addr = config.http_addr;
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
