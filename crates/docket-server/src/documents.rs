//! Document storage: metadata rows in SQLite, bytes on the local filesystem.
//!
//! Layout under the upload root is
//! `<sanitized client id | _uncategorized>/<sanitized case id | _general>/<uuid><ext>`,
//! and the relative path is recorded on the metadata row at upload time.
//!
//! The two writes are not transactional.  Upload runs them as a small saga:
//! the blob is written first, then the row; if the row insert fails the blob
//! is removed again.  Deletion removes the row first, then the blob; a blob
//! that cannot be unlinked is handed to the [`Reconciler`], which retries in
//! the background instead of letting the directory drift.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Multipart, Path as UrlPath, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use docket_store::{Document, DocumentCategory, DocumentFilter, StoreError};

use crate::api::AppState;
use crate::audit::{AuditEvent, RequestMeta};
use crate::auth::AdminUser;
use crate::error::{ensure, ApiError};

/// Accepted upload types and the extension each is stored under.
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("application/pdf", ".pdf"),
    ("image/png", ".png"),
    ("image/jpeg", ".jpg"),
    ("application/msword", ".doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
    ),
    ("text/plain", ".txt"),
    ("text/csv", ".csv"),
];

/// Extension for an allowlisted MIME type; `None` means the type is refused.
fn extension_for(mime: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(allowed, _)| *allowed == mime)
        .map(|(_, ext)| *ext)
}

/// Reduce an identifier to characters safe in a directory name.
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Verify that a resolved path stays within the upload root.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ApiError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(&canonical_base)
        .unwrap_or(target)
        .components()
    {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(ApiError::BadRequest("Path traversal detected".to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ApiError::BadRequest("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

pub struct DocumentStore {
    base_dir: PathBuf,
    max_size: usize,
}

impl DocumentStore {
    pub async fn new(base_dir: PathBuf, max_size: usize) -> Result<Self, ApiError> {
        fs::create_dir_all(&base_dir).await.map_err(|e| {
            ApiError::Storage(format!(
                "failed to create upload directory '{}': {e}",
                base_dir.display()
            ))
        })?;

        // Store the canonical form so the traversal check below compares
        // like against like even when configured with a relative path.
        let base_dir = base_dir.canonicalize().unwrap_or(base_dir);

        info!(path = %base_dir.display(), "document store initialized");

        Ok(Self { base_dir, max_size })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Relative storage path for a new blob.
    pub fn relative_path(client_id: Option<Uuid>, case_id: Option<Uuid>, filename: &str) -> String {
        let client_dir = client_id
            .map(|id| sanitize_component(&id.to_string()))
            .unwrap_or_else(|| "_uncategorized".to_string());
        let case_dir = case_id
            .map(|id| sanitize_component(&id.to_string()))
            .unwrap_or_else(|| "_general".to_string());
        format!("{client_dir}/{case_dir}/{filename}")
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, ApiError> {
        ensure_within(&self.base_dir, &self.base_dir.join(relative))
    }

    /// Write a blob at its relative path.  Rejects oversized payloads before
    /// anything touches disk.
    pub async fn write_blob(&self, relative: &str, data: &[u8]) -> Result<PathBuf, ApiError> {
        if data.is_empty() {
            return Err(ApiError::BadRequest("Empty file".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ApiError::FileTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::Storage(format!("failed to create blob dir: {e}")))?;
        }

        fs::write(&path, data)
            .await
            .map_err(|e| ApiError::Storage(format!("failed to write blob: {e}")))?;

        debug!(path = %path.display(), size = data.len(), "stored blob");
        Ok(path)
    }

    /// Read a blob.  A missing file is a 404, per the stored-layout contract.
    pub async fn read_blob(&self, relative: &str) -> Result<Vec<u8>, ApiError> {
        let path = self.resolve(relative)?;
        if !path.exists() {
            return Err(ApiError::NotFound("Document file"));
        }
        fs::read(&path)
            .await
            .map_err(|e| ApiError::Storage(format!("failed to read blob: {e}")))
    }

    /// Unlink a blob, resolving traversal first.  Callers decide what a
    /// failure means; deletion treats it as reconciliation work, not an
    /// error.
    pub async fn remove_blob(&self, relative: &str) -> Result<(), std::io::Error> {
        let path = match self.resolve(relative) {
            Ok(path) => path,
            Err(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "unsafe blob path",
                ))
            }
        };
        fs::remove_file(&path).await
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Queue of blob paths whose unlink failed after their metadata row was
/// already deleted.  Retried periodically; a path that turns out to be gone
/// counts as reconciled.
#[derive(Clone, Default)]
pub struct Reconciler {
    queue: Arc<Mutex<Vec<String>>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, relative: String) {
        warn!(path = %relative, "orphaned blob queued for reconciliation");
        self.queue.lock().await.push(relative);
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Retry every queued unlink once.  Returns how many entries cleared.
    pub async fn run_once(&self, store: &DocumentStore) -> usize {
        let drained: Vec<String> = {
            let mut queue = self.queue.lock().await;
            std::mem::take(&mut *queue)
        };
        if drained.is_empty() {
            return 0;
        }

        let mut cleared = 0;
        let mut remaining = Vec::new();
        for relative in drained {
            match store.remove_blob(&relative).await {
                Ok(()) => cleared += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => cleared += 1,
                Err(e) => {
                    warn!(path = %relative, error = %e, "blob reconciliation still failing");
                    remaining.push(relative);
                }
            }
        }

        if cleared > 0 {
            info!(cleared, "reconciled orphaned blobs");
        }
        if !remaining.is_empty() {
            self.queue.lock().await.extend(remaining);
        }
        cleared
    }
}

/// Background retry loop for the reconciliation queue.
pub fn spawn_reconciler(
    reconciler: Reconciler,
    store: Arc<DocumentStore>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick fires immediately; skip it.
        interval.tick().await;
        loop {
            interval.tick().await;
            reconciler.run_once(&store).await;
        }
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentListQuery {
    client_id: Option<Uuid>,
    case_id: Option<Uuid>,
    category: Option<String>,
    q: Option<String>,
}

struct UploadFields {
    data: Vec<u8>,
    original_name: String,
    mime_type: String,
    client_id: Option<Uuid>,
    case_id: Option<Uuid>,
    category: DocumentCategory,
    description: Option<String>,
}

async fn read_upload(multipart: &mut Multipart) -> Result<UploadFields, ApiError> {
    let mut data = None;
    let mut original_name = None;
    let mut mime_type = None;
    let mut client_id = None;
    let mut case_id = None;
    let mut category = DocumentCategory::Other;
    let mut description = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                original_name = field.file_name().map(|s| s.to_string());
                mime_type = field.content_type().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {e}")))?;
                data = Some(bytes.to_vec());
            }
            "clientId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {e}")))?;
                if !text.is_empty() {
                    client_id =
                        Some(Uuid::parse_str(&text).map_err(|_| ApiError::Validation)?);
                }
            }
            "caseId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {e}")))?;
                if !text.is_empty() {
                    case_id = Some(Uuid::parse_str(&text).map_err(|_| ApiError::Validation)?);
                }
            }
            "category" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {e}")))?;
                if !text.is_empty() {
                    category = DocumentCategory::parse(&text).ok_or(ApiError::Validation)?;
                }
            }
            "description" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {e}")))?;
                if !text.is_empty() {
                    description = Some(text);
                }
            }
            _ => {}
        }
    }

    let data = data.ok_or_else(|| {
        ApiError::BadRequest("Missing 'file' field in multipart form".to_string())
    })?;
    let mime_type = mime_type
        .ok_or_else(|| ApiError::BadRequest("File field has no content type".to_string()))?;

    Ok(UploadFields {
        data,
        original_name: original_name.unwrap_or_else(|| "upload".to_string()),
        mime_type,
        client_id,
        case_id,
        category,
        description,
    })
}

/// POST /api/documents
pub async fn upload_document(
    admin: AdminUser,
    State(state): State<AppState>,
    meta: RequestMeta,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let fields = read_upload(&mut multipart).await?;

    // Refuse disallowed types before any byte reaches disk.
    let ext = extension_for(&fields.mime_type).ok_or_else(|| {
        debug!(mime = %fields.mime_type, "upload with disallowed content type");
        ApiError::BadRequest(format!("Unsupported file type: {}", fields.mime_type))
    })?;

    // Linked records must exist, and a case must belong to the named client.
    {
        let db = state.db.lock().await;
        if let Some(client_id) = fields.client_id {
            db.get_client(client_id).map_err(|e| match e {
                StoreError::NotFound => ApiError::Validation,
                other => ApiError::Store(other),
            })?;
        }
        if let Some(case_id) = fields.case_id {
            let case = db.get_case(case_id).map_err(|e| match e {
                StoreError::NotFound => ApiError::Validation,
                other => ApiError::Store(other),
            })?;
            if let Some(client_id) = fields.client_id {
                ensure(case.client_id == client_id, "upload: case/client mismatch")?;
            }
        }
    }

    let id = Uuid::new_v4();
    let filename = format!("{id}{ext}");
    let storage_path = DocumentStore::relative_path(fields.client_id, fields.case_id, &filename);

    let document = Document {
        id,
        filename,
        original_name: fields.original_name,
        storage_path: storage_path.clone(),
        size: fields.data.len() as i64,
        mime_type: fields.mime_type,
        client_id: fields.client_id,
        case_id: fields.case_id,
        category: fields.category,
        description: fields.description,
        uploaded_by: admin.0.id,
        created_at: Utc::now(),
    };

    // Saga: blob first, then the row; a failed row insert compensates by
    // removing the blob again.
    state.documents.write_blob(&storage_path, &fields.data).await?;

    let inserted = {
        let db = state.db.lock().await;
        db.insert_document(&document)
    };
    if let Err(e) = inserted {
        if let Err(unlink_err) = state.documents.remove_blob(&storage_path).await {
            warn!(error = %unlink_err, "compensating blob delete failed");
            state.reconciler.enqueue(storage_path).await;
        }
        return Err(ApiError::Store(e));
    }

    info!(id = %document.id, size = document.size, "document uploaded");

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(admin.0.id),
                action: "document.upload",
                resource_type: "document",
                resource_id: Some(document.id.to_string()),
                success: true,
                details: Some(json!({
                    "originalName": document.original_name,
                    "mimeType": document.mime_type,
                    "size": document.size,
                })),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /api/documents
pub async fn list_documents(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<DocumentListQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let category = match query.category.as_deref() {
        Some(raw) => Some(DocumentCategory::parse(raw).ok_or(ApiError::Validation)?),
        None => None,
    };

    let filter = DocumentFilter {
        client_id: query.client_id,
        case_id: query.case_id,
        category,
        q: query.q.filter(|q| !q.trim().is_empty()),
    };

    let db = state.db.lock().await;
    let documents = db.list_documents(&filter)?;
    Ok(Json(documents))
}

/// GET /api/documents/{id}
pub async fn get_document(
    _admin: AdminUser,
    State(state): State<AppState>,
    UrlPath(id): UrlPath<Uuid>,
) -> Result<Json<Document>, ApiError> {
    let db = state.db.lock().await;
    let document = db.get_document(id)?;
    Ok(Json(document))
}

/// GET /api/documents/{id}/download
///
/// Streams the original bytes with the uploaded filename in
/// Content-Disposition, never the internal UUID name.
pub async fn download_document(
    admin: AdminUser,
    State(state): State<AppState>,
    meta: RequestMeta,
    UrlPath(id): UrlPath<Uuid>,
) -> Result<(HeaderMap, Vec<u8>), ApiError> {
    let document = {
        let db = state.db.lock().await;
        db.get_document(id)?
    };

    let data = state.documents.read_blob(&document.storage_path).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(&document.mime_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    let disposition = format!(
        "attachment; filename=\"{}\"",
        document.original_name.replace(['"', '\r', '\n'], "_")
    );
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or(HeaderValue::from_static("attachment; filename=\"download\"")),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(admin.0.id),
                action: "document.download",
                resource_type: "document",
                resource_id: Some(id.to_string()),
                success: true,
                details: None,
            },
        )
        .await;

    Ok((headers, data))
}

/// DELETE /api/documents/{id}
///
/// The metadata row goes first.  A blob that cannot be unlinked afterwards
/// does not fail the request; it is queued for reconciliation.
pub async fn delete_document(
    admin: AdminUser,
    State(state): State<AppState>,
    meta: RequestMeta,
    UrlPath(id): UrlPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let document = {
        let db = state.db.lock().await;
        db.get_document(id)?
    };

    {
        let db = state.db.lock().await;
        if !db.delete_document(id)? {
            return Err(ApiError::Store(StoreError::NotFound));
        }
    }

    match state.documents.remove_blob(&document.storage_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Already gone on disk; nothing to reconcile.
            debug!(id = %id, "blob was already missing at delete");
        }
        Err(e) => {
            warn!(id = %id, error = %e, "blob unlink failed after row delete");
            state.reconciler.enqueue(document.storage_path.clone()).await;
        }
    }

    info!(id = %id, "document deleted");

    state
        .audit
        .record(
            &meta,
            AuditEvent {
                user_id: Some(admin.0.id),
                action: "document.delete",
                resource_type: "document",
                resource_id: Some(id.to_string()),
                success: true,
                details: None,
            },
        )
        .await;

    Ok(Json(json!({ "deleted": true })))
}
