//! HTTP surface: shared state, the route table, and the listener.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::{middleware, Json, Router};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use docket_store::Database;

use crate::ai::AiClient;
use crate::audit::{self, AuditRecorder};
use crate::auth;
use crate::billing;
use crate::cases;
use crate::config::ServerConfig;
use crate::crm;
use crate::documents::{self, DocumentStore, Reconciler};
use crate::mailer::Mailer;
use crate::portal;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

/// Multipart envelope ceiling.  Generous on purpose: the authoritative
/// 20 MB per-file cap lives in the document store, so an oversized upload
/// reaches the handler and gets the size-limit error instead of a blind 413.
const BODY_LIMIT: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub documents: Arc<DocumentStore>,
    pub mailer: Arc<Mailer>,
    pub ai: Arc<AiClient>,
    pub audit: AuditRecorder,
    pub reconciler: Reconciler,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        // Authentication
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route(
            "/api/auth/user",
            get(auth::current_user).put(auth::update_profile),
        )
        .route(
            "/api/auth/profile",
            get(auth::current_user).put(auth::update_profile),
        )
        // Clients
        .route("/api/clients", get(crm::list_clients))
        .route("/api/clients", post(crm::create_client))
        .route("/api/clients/{id}", get(crm::get_client))
        .route("/api/clients/{id}", put(crm::update_client))
        .route(
            "/api/clients/{id}/communications",
            get(crm::client_communications),
        )
        // Consultations
        .route("/api/consultations", get(crm::list_consultations))
        .route("/api/consultations", post(crm::book_consultation))
        .route("/api/consultations/{id}", get(crm::get_consultation))
        .route("/api/consultations/{id}", put(crm::update_consultation))
        // Cases
        .route("/api/cases", get(cases::list_cases))
        .route("/api/cases", post(cases::create_case))
        .route("/api/cases/{id}", get(cases::get_case))
        .route("/api/cases/{id}", put(cases::update_case))
        // Invoices
        .route("/api/invoices", get(billing::list_invoices))
        .route("/api/invoices", post(billing::create_invoice))
        .route("/api/invoices/{id}", get(billing::get_invoice))
        .route("/api/invoices/{id}", put(billing::update_invoice))
        // Search
        .route("/api/search/clients", get(crm::search_clients))
        .route("/api/search/cases", get(crm::search_cases))
        .route("/api/search/consultations", get(crm::search_consultations))
        // Dashboard and public intake
        .route("/api/dashboard/stats", get(crm::dashboard_stats))
        .route("/api/contact", post(crm::submit_contact))
        // AI assistant
        .route("/api/ai/chat", post(crate::ai::chat))
        // Client portal
        .route("/api/client-portal/access", post(portal::request_access))
        .route("/api/client-portal/{token}", get(portal::resolve_access))
        // Documents
        .route("/api/documents", get(documents::list_documents))
        .route("/api/documents", post(documents::upload_document))
        .route("/api/documents/{id}", get(documents::get_document))
        .route(
            "/api/documents/{id}/download",
            get(documents::download_document),
        )
        .route("/api/documents/{id}", delete(documents::delete_document))
        // Administration
        .route("/api/audit-logs", get(audit::list_audit_logs))
        .route("/api/admin/cleanup-tokens", post(portal::cleanup_tokens))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use docket_store::ClientToken;

    use crate::testutil::{test_app, TestAppBuilder};

    /// True when `s` contains a run of 64+ hex digits, i.e. something that
    /// could be a portal token.
    fn contains_long_hex(s: &str) -> bool {
        let mut run = 0;
        for c in s.chars() {
            if c.is_ascii_hexdigit() {
                run += 1;
                if run >= 64 {
                    return true;
                }
            } else {
                run = 0;
            }
        }
        false
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = test_app().await;
        let (status, body) = app.get("/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_and_garbage_credentials() {
        let app = test_app().await;

        let (status, body) = app.get("/api/clients", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");

        let (status, body) = app.get("/api/clients", Some("not-a-jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid token");
    }

    #[tokio::test]
    async fn login_round_trip_and_wrong_password() {
        let app = test_app().await;
        app.register_admin().await;

        let (status, body) = app
            .post(
                "/api/auth/login",
                None,
                json!({ "email": "admin@test.example", "password": "wrong-password" }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");

        let (status, body) = app
            .post(
                "/api/auth/login",
                None,
                json!({ "email": "admin@test.example", "password": "correct-horse-battery" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some());
        assert_eq!(body["user"]["email"], "admin@test.example");
    }

    #[tokio::test]
    async fn user_payloads_never_carry_the_password_hash() {
        let app = test_app().await;
        let token = app.register_admin().await;

        let (status, body) = app.get("/api/auth/user", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let user = body.as_object().unwrap();
        assert!(!user.contains_key("passwordHash"));
        assert!(!user.contains_key("password"));
    }

    #[tokio::test]
    async fn profile_update_changes_the_photo() {
        let app = test_app().await;
        let token = app.register_admin().await;

        let (status, body) = app
            .put(
                "/api/auth/profile",
                Some(&token),
                json!({ "profilePhoto": "https://cdn.test.example/me.png" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profilePhoto"], "https://cdn.test.example/me.png");

        let (_, body) = app.get("/api/auth/profile", Some(&token)).await;
        assert_eq!(body["profilePhoto"], "https://cdn.test.example/me.png");
    }

    #[tokio::test]
    async fn client_validation_failures_stay_generic() {
        let app = test_app().await;
        let (status, body) = app
            .post(
                "/api/clients",
                None,
                json!({ "firstName": "A", "lastName": "B", "email": "not-an-email" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid data");
    }

    #[tokio::test]
    async fn malformed_bodies_stay_generic() {
        let app = test_app().await;
        let token = app.register_admin().await;

        // Unknown enum variant: "pending" is not a case status.
        let (status, body) = app
            .post(
                "/api/cases",
                Some(&token),
                json!({
                    "clientId": Uuid::new_v4(),
                    "title": "Variant check",
                    "caseType": "other",
                    "status": "pending"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid data");

        // Missing required fields get the same answer, with no hint of
        // which field was the problem.
        let (status, body) = app
            .post("/api/clients", None, json!({ "firstName": "Solo" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid data");
        assert_eq!(body.as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_client_email_conflicts() {
        let app = test_app().await;
        app.create_client("dana@test.example").await;

        let (status, _) = app
            .post(
                "/api/clients",
                None,
                json!({ "firstName": "Dana", "lastName": "W", "email": "dana@test.example" }),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn client_listing_is_newest_first_and_repeatable() {
        let app = test_app().await;
        let token = app.register_admin().await;

        for n in 1..=3 {
            app.create_client(&format!("client{n}@test.example")).await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let (status, first) = app.get("/api/clients", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let emails: Vec<&str> = first
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["email"].as_str().unwrap())
            .collect();
        assert_eq!(
            emails,
            vec![
                "client3@test.example",
                "client2@test.example",
                "client1@test.example"
            ]
        );

        let (_, second) = app.get("/api/clients", Some(&token)).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn booking_with_unknown_email_creates_the_client() {
        let app = test_app().await;
        let token = app.register_admin().await;

        let (status, consultation) = app
            .post(
                "/api/consultations",
                None,
                json!({
                    "clientEmail": "a@b.com",
                    "firstName": "A",
                    "lastName": "B",
                    "type": "phone",
                    "caseType": "civil-litigation",
                    "scheduledAt": "2026-09-01T15:00:00Z"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "booking failed: {consultation}");
        assert_eq!(consultation["type"], "phone");
        assert_eq!(consultation["status"], "scheduled");

        let (_, clients) = app.get("/api/clients", Some(&token)).await;
        let created = clients
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["email"] == "a@b.com")
            .expect("client row auto-created");
        assert_eq!(created["id"], consultation["clientId"]);
    }

    #[tokio::test]
    async fn booking_twice_reuses_the_same_client() {
        let app = test_app().await;
        let booking = json!({
            "clientEmail": "repeat@test.example",
            "firstName": "R",
            "lastName": "Peat",
            "type": "virtual",
            "caseType": "family-law",
            "scheduledAt": "2026-09-02T10:00:00Z"
        });

        let (_, first) = app.post("/api/consultations", None, booking.clone()).await;
        let (_, second) = app.post("/api/consultations", None, booking).await;
        assert_eq!(first["clientId"], second["clientId"]);
    }

    #[tokio::test]
    async fn booking_confirmation_lands_in_communication_history() {
        let app = test_app().await;
        let token = app.register_admin().await;

        let (_, consultation) = app
            .post(
                "/api/consultations",
                None,
                json!({
                    "clientEmail": "comm@test.example",
                    "firstName": "C",
                    "lastName": "Ms",
                    "type": "in-person",
                    "caseType": "estate-planning",
                    "scheduledAt": "2026-09-03T09:00:00Z"
                }),
            )
            .await;

        let client_id = consultation["clientId"].as_str().unwrap();
        let (status, history) = app
            .get(&format!("/api/clients/{client_id}/communications"), Some(&token))
            .await;
        assert_eq!(status, StatusCode::OK);
        let entries = history.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["direction"], "outbound");
        assert_eq!(entries[0]["channel"], "email");
        assert_eq!(entries[0]["status"], "sent");
    }

    #[tokio::test]
    async fn booking_survives_a_dead_mail_provider() {
        let app = TestAppBuilder::default().failing_mailer().build().await;
        let token = app.register_admin().await;

        let (status, consultation) = app
            .post(
                "/api/consultations",
                None,
                json!({
                    "clientEmail": "unreached@test.example",
                    "firstName": "U",
                    "lastName": "Nr",
                    "type": "virtual",
                    "caseType": "family-law",
                    "scheduledAt": "2026-09-04T10:00:00Z"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        // The booking stands; only the confirmation email is marked failed.
        let client_id = consultation["clientId"].as_str().unwrap();
        let (_, history) = app
            .get(&format!("/api/clients/{client_id}/communications"), Some(&token))
            .await;
        let entries = history.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["status"], "failed");
    }

    #[tokio::test]
    async fn contact_form_records_inbound_and_acknowledgement() {
        let app = test_app().await;
        let token = app.register_admin().await;

        let (status, _) = app
            .post(
                "/api/contact",
                None,
                json!({
                    "firstName": "Ines",
                    "lastName": "Ferro",
                    "email": "ines@test.example",
                    "message": "I need help reviewing a lease."
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, clients) = app.get("/api/clients", Some(&token)).await;
        let client_id = clients.as_array().unwrap()[0]["id"].as_str().unwrap().to_string();

        let (_, history) = app
            .get(&format!("/api/clients/{client_id}/communications"), Some(&token))
            .await;
        let directions: Vec<&str> = history
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["direction"].as_str().unwrap())
            .collect();
        assert_eq!(directions.len(), 2);
        assert!(directions.contains(&"inbound"));
        assert!(directions.contains(&"outbound"));
    }

    #[tokio::test]
    async fn case_lifecycle_create_then_close() {
        let app = test_app().await;
        let token = app.register_admin().await;
        let client_id = app.create_client("cases@test.example").await;

        let (status, case) = app
            .post(
                "/api/cases",
                Some(&token),
                json!({
                    "clientId": client_id,
                    "title": "Whitfield v. Harmon",
                    "caseType": "civil-litigation"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(case["status"], "active");
        assert_eq!(case["totalFees"], 0.0);

        let case_id = case["id"].as_str().unwrap();
        let (status, updated) = app
            .put(
                &format!("/api/cases/{case_id}"),
                Some(&token),
                json!({ "status": "closed", "totalFees": 1250.0 }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "closed");
        assert_eq!(updated["totalFees"], 1250.0);
    }

    #[tokio::test]
    async fn case_for_unknown_client_is_invalid() {
        let app = test_app().await;
        let token = app.register_admin().await;

        let (status, body) = app
            .post(
                "/api/cases",
                Some(&token),
                json!({
                    "clientId": Uuid::new_v4(),
                    "title": "Orphan matter",
                    "caseType": "other"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid data");
    }

    #[tokio::test]
    async fn invoice_numbering_and_paid_stamp() {
        let app = test_app().await;
        let token = app.register_admin().await;
        let client_id = app.create_client("billing@test.example").await;

        let (status, invoice) = app
            .post(
                "/api/invoices",
                Some(&token),
                json!({ "clientId": client_id, "amount": 100.0, "tax": 10.0 }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(invoice["invoiceNumber"].as_str().unwrap().starts_with("INV-"));
        assert_eq!(invoice["totalAmount"], 110.0);
        assert_eq!(invoice["status"], "draft");
        assert!(invoice["paidAt"].is_null());

        let invoice_id = invoice["id"].as_str().unwrap();
        let (_, paid) = app
            .put(
                &format!("/api/invoices/{invoice_id}"),
                Some(&token),
                json!({ "status": "paid" }),
            )
            .await;
        assert_eq!(paid["status"], "paid");
        assert!(paid["paidAt"].is_string());

        let (_, reopened) = app
            .put(
                &format!("/api/invoices/{invoice_id}"),
                Some(&token),
                json!({ "status": "sent" }),
            )
            .await;
        assert!(reopened["paidAt"].is_null());
    }

    #[tokio::test]
    async fn dashboard_aggregates_the_seeded_rows() {
        let app = test_app().await;
        let token = app.register_admin().await;
        let client_id = app.create_client("stats@test.example").await;

        app.post(
            "/api/cases",
            Some(&token),
            json!({ "clientId": client_id, "title": "Estate of M.", "caseType": "probate" }),
        )
        .await;
        app.post(
            "/api/consultations",
            None,
            json!({
                "clientEmail": "stats@test.example",
                "firstName": "Dana",
                "lastName": "Whitfield",
                "type": "phone",
                "caseType": "probate",
                "scheduledAt": "2026-09-10T11:00:00Z"
            }),
        )
        .await;
        app.post(
            "/api/invoices",
            Some(&token),
            json!({ "clientId": client_id, "amount": 100.0, "tax": 10.0, "status": "sent" }),
        )
        .await;

        let (status, stats) = app.get("/api/dashboard/stats", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalClients"], 1);
        assert_eq!(stats["activeCases"], 1);
        assert_eq!(stats["scheduledConsultations"], 1);
        assert_eq!(stats["outstandingBalance"], 110.0);
    }

    #[tokio::test]
    async fn search_reaches_names_and_requires_a_term() {
        let app = test_app().await;
        let token = app.register_admin().await;
        let client_id = app.create_client("evelyn.marsh@test.example").await;

        app.post(
            "/api/cases",
            Some(&token),
            json!({ "clientId": client_id, "title": "Marsh estate", "caseType": "probate" }),
        )
        .await;
        app.post(
            "/api/consultations",
            None,
            json!({
                "clientEmail": "evelyn.marsh@test.example",
                "firstName": "Dana",
                "lastName": "Whitfield",
                "type": "virtual",
                "caseType": "probate",
                "scheduledAt": "2026-09-12T14:00:00Z"
            }),
        )
        .await;

        let (_, clients) = app.get("/api/search/clients?q=marsh", Some(&token)).await;
        assert_eq!(clients.as_array().unwrap().len(), 1);

        let (_, cases) = app.get("/api/search/cases?q=estate", Some(&token)).await;
        assert_eq!(cases.as_array().unwrap().len(), 1);

        // Consultation search joins the client name.
        let (_, consultations) = app
            .get("/api/search/consultations?q=whitfield", Some(&token))
            .await;
        assert_eq!(consultations.as_array().unwrap().len(), 1);

        let (status, _) = app.get("/api/search/clients", Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_download_round_trip_preserves_bytes_and_name() {
        let app = test_app().await;
        let token = app.register_admin().await;
        let client_id = app.create_client("docs@test.example").await;

        let content = b"%PDF-1.4 fake retainer agreement body";
        let (status, doc) = app
            .upload(
                &token,
                &[("clientId", client_id.as_str()), ("category", "contract")],
                "retainer agreement.pdf",
                "application/pdf",
                content,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "upload failed: {doc}");
        assert_eq!(doc["originalName"], "retainer agreement.pdf");
        assert_eq!(doc["category"], "contract");
        assert_eq!(doc["size"], content.len() as i64);

        let doc_id = doc["id"].as_str().unwrap();
        let req = Request::builder()
            .method(Method::GET)
            .uri(format!("/api/documents/{doc_id}/download"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let resp = app.send(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "application/pdf"
        );
        let disposition = resp.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.contains("retainer agreement.pdf"));
        assert!(!disposition.contains(doc_id));

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], content);
    }

    #[tokio::test]
    async fn disallowed_mime_type_writes_nothing() {
        let app = test_app().await;
        let token = app.register_admin().await;

        let (status, body) = app
            .upload(
                &token,
                &[],
                "malware.exe",
                "application/x-msdownload",
                b"MZfake",
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("Unsupported file type"));

        // Nothing may land on disk, not even the directory skeleton.
        let entries: Vec<_> = std::fs::read_dir(&app.upload_dir).unwrap().collect();
        assert!(entries.is_empty());

        let (_, docs) = app.get("/api/documents", Some(&token)).await;
        assert!(docs.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversize_upload_cites_the_limit_and_leaves_no_row() {
        let app = test_app().await;
        let token = app.register_admin().await;

        let oversized = vec![0u8; 25 * 1024 * 1024];
        let (status, body) = app
            .upload(&token, &[], "huge.pdf", "application/pdf", &oversized)
            .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["error"].as_str().unwrap().contains("File too large"));

        let (_, docs) = app.get("/api/documents", Some(&token)).await;
        assert!(docs.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn document_listing_filters_by_client() {
        let app = test_app().await;
        let token = app.register_admin().await;
        let client_a = app.create_client("a@test.example").await;
        let client_b = app.create_client("b@test.example").await;

        app.upload(
            &token,
            &[("clientId", client_a.as_str())],
            "a.txt",
            "text/plain",
            b"for client a",
        )
        .await;
        app.upload(
            &token,
            &[("clientId", client_b.as_str())],
            "b.txt",
            "text/plain",
            b"for client b",
        )
        .await;

        let (_, all) = app.get("/api/documents", Some(&token)).await;
        assert_eq!(all.as_array().unwrap().len(), 2);

        let (_, filtered) = app
            .get(&format!("/api/documents?clientId={client_a}"), Some(&token))
            .await;
        let filtered = filtered.as_array().unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0]["originalName"], "a.txt");

        let (_, searched) = app.get("/api/documents?q=b.txt", Some(&token)).await;
        let searched = searched.as_array().unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0]["originalName"], "b.txt");
    }

    #[tokio::test]
    async fn delete_succeeds_when_the_blob_is_already_gone() {
        let app = test_app().await;
        let token = app.register_admin().await;

        let (_, doc) = app
            .upload(&token, &[], "note.txt", "text/plain", b"temporary")
            .await;
        let doc_id = doc["id"].as_str().unwrap();

        // Remove the blob behind the API's back.
        let storage_path = {
            let db = app.db.lock().await;
            db.get_document(Uuid::parse_str(doc_id).unwrap())
                .unwrap()
                .storage_path
        };
        std::fs::remove_file(app.upload_dir.join(&storage_path)).unwrap();

        let (status, body) = app
            .delete(&format!("/api/documents/{doc_id}"), Some(&token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);
        assert_eq!(app.reconciler.pending().await, 0);

        let (status, _) = app.get(&format!("/api/documents/{doc_id}"), Some(&token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn portal_access_failure_withholds_the_token() {
        let app = TestAppBuilder::default().failing_mailer().build().await;
        app.create_client("portal@test.example").await;

        let (status, body) = app
            .post(
                "/api/client-portal/access",
                None,
                json!({ "email": "portal@test.example" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Failed to deliver access email");
        assert!(!contains_long_hex(&body.to_string()));

        // The row exists (the sweep will age it out), but its value stayed
        // inside the database.
        let (count, stored_token) = {
            let db = app.db.lock().await;
            let count: i64 = db
                .conn()
                .query_row("SELECT COUNT(*) FROM client_tokens", [], |row| row.get(0))
                .unwrap();
            let token: String = db
                .conn()
                .query_row("SELECT token FROM client_tokens", [], |row| row.get(0))
                .unwrap();
            (count, token)
        };
        assert_eq!(count, 1);
        assert!(!body.to_string().contains(&stored_token));
    }

    #[tokio::test]
    async fn portal_access_success_reveals_no_token_either() {
        let app = test_app().await;
        app.create_client("portal2@test.example").await;

        let (status, body) = app
            .post(
                "/api/client-portal/access",
                None,
                json!({ "email": "portal2@test.example" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().is_some());
        assert!(!contains_long_hex(&body.to_string()));
    }

    #[tokio::test]
    async fn portal_access_for_unknown_email_is_not_found() {
        let app = test_app().await;
        let (status, _) = app
            .post(
                "/api/client-portal/access",
                None,
                json!({ "email": "nobody@test.example" }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn portal_snapshot_resolves_only_unexpired_tokens() {
        let app = test_app().await;
        let token = app.register_admin().await;
        let client_id = app.create_client("snapshot@test.example").await;
        let client_uuid = Uuid::parse_str(&client_id).unwrap();

        app.post(
            "/api/cases",
            Some(&token),
            json!({ "clientId": client_id, "title": "Lease dispute", "caseType": "real-estate" }),
        )
        .await;

        let live = "a".repeat(64);
        let expired = "b".repeat(64);
        {
            let db = app.db.lock().await;
            db.insert_client_token(&ClientToken {
                id: Uuid::new_v4(),
                client_id: client_uuid,
                token: live.clone(),
                expires_at: Utc::now() + ChronoDuration::hours(1),
                created_at: Utc::now(),
            })
            .unwrap();
            db.insert_client_token(&ClientToken {
                id: Uuid::new_v4(),
                client_id: client_uuid,
                token: expired.clone(),
                expires_at: Utc::now() - ChronoDuration::hours(1),
                created_at: Utc::now(),
            })
            .unwrap();
        }

        let (status, snapshot) = app.get(&format!("/api/client-portal/{live}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["client"]["email"], "snapshot@test.example");
        assert_eq!(snapshot["cases"].as_array().unwrap().len(), 1);
        assert!(snapshot["consultations"].as_array().unwrap().is_empty());
        assert!(snapshot["invoices"].as_array().unwrap().is_empty());

        let (status, body) = app.get(&format!("/api/client-portal/{expired}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Invalid or expired access link");

        let bogus = "c".repeat(64);
        let (status, _) = app.get(&format!("/api/client-portal/{bogus}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cleanup_tokens_is_admin_only_and_counts_deletions() {
        let app = test_app().await;
        let token = app.register_admin().await;
        let client_id = app.create_client("sweep@test.example").await;

        {
            let db = app.db.lock().await;
            db.insert_client_token(&ClientToken {
                id: Uuid::new_v4(),
                client_id: Uuid::parse_str(&client_id).unwrap(),
                token: "d".repeat(64),
                expires_at: Utc::now() - ChronoDuration::minutes(5),
                created_at: Utc::now() - ChronoDuration::hours(25),
            })
            .unwrap();
        }

        let (status, _) = app
            .request_json(Method::POST, "/api/admin/cleanup-tokens", None, None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app
            .request_json(Method::POST, "/api/admin/cleanup-tokens", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 1);
    }

    #[tokio::test]
    async fn chat_outage_returns_bad_gateway_but_keeps_the_user_turn() {
        let app = test_app().await;

        let (status, body) = app
            .post(
                "/api/ai/chat",
                None,
                json!({ "sessionId": "session-1", "message": "What are your office hours?" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY, "unexpected: {body}");

        let session = {
            let db = app.db.lock().await;
            db.get_chat_session("session-1").unwrap()
        };
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].role, "user");
    }

    #[tokio::test]
    async fn audit_log_records_admin_actions_with_redaction() {
        let app = test_app().await;
        let token = app.register_admin().await;
        app.create_client("audited@test.example").await;

        let (status, _) = app.get("/api/audit-logs", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, logs) = app.get("/api/audit-logs", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let logs = logs.as_array().unwrap();
        assert!(logs.iter().any(|l| l["action"] == "client.create"));
        assert!(logs.iter().any(|l| l["action"] == "auth.register"));
        // Registration details include the email but never credentials.
        assert!(!logs.iter().any(|l| l.to_string().contains("correct-horse-battery")));

        let (_, narrowed) = app
            .get("/api/audit-logs?resourceType=client", Some(&token))
            .await;
        let narrowed = narrowed.as_array().unwrap();
        assert!(!narrowed.is_empty());
        assert!(narrowed.iter().all(|l| l["resourceType"] == "client"));
    }

    #[tokio::test]
    async fn rate_limit_kicks_in_per_ip() {
        let app = TestAppBuilder::default().rate_limit(2).build().await;

        for n in 0..3 {
            let req = Request::builder()
                .method(Method::GET)
                .uri("/api/health")
                .header("x-forwarded-for", "9.9.9.9")
                .body(Body::empty())
                .unwrap();
            let resp = app.send(req).await;
            if n < 2 {
                assert_eq!(resp.status(), StatusCode::OK);
            } else {
                assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
            }
        }

        // A different address is unaffected.
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .header("x-forwarded-for", "8.8.8.8")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(req).await.status(), StatusCode::OK);
    }
}
