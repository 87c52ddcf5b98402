//! Shared test harness: a complete application wired over temp storage,
//! driven through the router without binding a socket.
//!
//! Email defaults to the log-only fallback and the AI client points at an
//! unreachable endpoint, so nothing in here touches the network.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

use docket_store::Database;

use crate::ai::AiClient;
use crate::api::{build_router, AppState};
use crate::audit::AuditRecorder;
use crate::config::{ServerConfig, MAX_UPLOAD_SIZE};
use crate::documents::{DocumentStore, Reconciler};
use crate::mailer::Mailer;
use crate::rate_limit::RateLimiter;

pub const MULTIPART_BOUNDARY: &str = "docket-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub db: Arc<Mutex<Database>>,
    pub reconciler: Reconciler,
    pub upload_dir: PathBuf,
    _tmp: TempDir,
}

#[derive(Default)]
pub struct TestAppBuilder {
    failing_mailer: bool,
    rate_limit: Option<usize>,
}

impl TestAppBuilder {
    /// Route all outgoing email at a closed port so every send fails.
    pub fn failing_mailer(mut self) -> Self {
        self.failing_mailer = true;
        self
    }

    pub fn rate_limit(mut self, max_requests: usize) -> Self {
        self.rate_limit = Some(max_requests);
        self
    }

    pub async fn build(self) -> TestApp {
        let tmp = TempDir::new().unwrap();
        let upload_dir = tmp.path().join("uploads");

        let config = ServerConfig {
            http_addr: ([127, 0, 0, 1], 0).into(),
            database_path: tmp.path().join("docket.db"),
            upload_dir: upload_dir.clone(),
            jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            sendgrid_api_key: None,
            from_email: "noreply@test.example".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            ai_api_key: "test-key".to_string(),
        };

        let db = Arc::new(Mutex::new(Database::open_at(&config.database_path).unwrap()));
        let documents = Arc::new(
            DocumentStore::new(upload_dir.clone(), MAX_UPLOAD_SIZE)
                .await
                .unwrap(),
        );

        let mailer = if self.failing_mailer {
            Mailer::new(Some("test-key".to_string()), config.from_email.clone())
                .with_endpoint("http://127.0.0.1:9")
        } else {
            Mailer::new(None, config.from_email.clone())
        };

        let ai = AiClient::new(config.ai_api_key.clone()).with_base_url("http://127.0.0.1:9");

        let rate_limiter = RateLimiter::new(
            self.rate_limit.unwrap_or(10_000),
            Duration::from_secs(60),
        );

        let reconciler = Reconciler::new();
        let state = AppState {
            db: db.clone(),
            documents,
            mailer: Arc::new(mailer),
            ai: Arc::new(ai),
            audit: AuditRecorder::new(db.clone()),
            reconciler: reconciler.clone(),
            rate_limiter,
            config: Arc::new(config),
        };

        TestApp {
            router: build_router(state),
            db,
            reconciler,
            upload_dir,
            _tmp: tmp,
        }
    }
}

pub async fn test_app() -> TestApp {
    TestAppBuilder::default().build().await
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&value).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = self.send(req).await;
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request_json(Method::GET, path, token, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        self.request_json(Method::POST, path, token, Some(body)).await
    }

    pub async fn put(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request_json(Method::PUT, path, token, Some(body)).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request_json(Method::DELETE, path, token, None).await
    }

    /// Register the standard test admin and return a bearer token.
    pub async fn register_admin(&self) -> String {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({ "email": "admin@test.example", "password": "correct-horse-battery" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "admin registration failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    /// Create a client over the public endpoint and return its id.
    pub async fn create_client(&self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/api/clients",
                None,
                json!({ "firstName": "Dana", "lastName": "Whitfield", "email": email }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "client creation failed: {body}");
        body["id"].as_str().unwrap().to_string()
    }

    /// Upload a document through the multipart endpoint.
    pub async fn upload(
        &self,
        token: &str,
        fields: &[(&str, &str)],
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> (StatusCode, Value) {
        let body = multipart_body(fields, filename, content_type, data);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/documents")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let resp = self.send(req).await;
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

/// Hand-rolled multipart body: text fields first, then one file part.
pub fn multipart_body(
    fields: &[(&str, &str)],
    filename: &str,
    content_type: &str,
    data: &[u8],
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; \
                 name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; \
             name=\"file\"; filename=\"{filename}\"\r\nContent-Type: \
             {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}
