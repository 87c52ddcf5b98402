//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` with camelCase field names so rows can be
//! handed directly to the browser client as JSON.  Status enums carry
//! `as_str` / `parse` helpers because they are stored as TEXT columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Role of an administrative user.  The schema only knows `admin`; the role
/// check on privileged routes is kept anyway as defence against future roles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// Lifecycle of a legal matter.  Canonical set; see DESIGN.md for the
/// resolution of the historical `open`/`in-progress`/`settled`/`dismissed`
/// labels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CaseStatus {
    Active,
    Closed,
    OnHold,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Active => "active",
            CaseStatus::Closed => "closed",
            CaseStatus::OnHold => "on-hold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CaseStatus::Active),
            "closed" => Some(CaseStatus::Closed),
            "on-hold" => Some(CaseStatus::OnHold),
            _ => None,
        }
    }
}

/// How a consultation is held.  Serialized as `type` in JSON, matching the
/// public booking form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConsultationKind {
    Phone,
    Virtual,
    InPerson,
}

impl ConsultationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationKind::Phone => "phone",
            ConsultationKind::Virtual => "virtual",
            ConsultationKind::InPerson => "in-person",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "phone" => Some(ConsultationKind::Phone),
            "virtual" => Some(ConsultationKind::Virtual),
            "in-person" => Some(ConsultationKind::InPerson),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConsultationStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::Scheduled => "scheduled",
            ConsultationStatus::Completed => "completed",
            ConsultationStatus::Cancelled => "cancelled",
            ConsultationStatus::NoShow => "no-show",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(ConsultationStatus::Scheduled),
            "completed" => Some(ConsultationStatus::Completed),
            "cancelled" => Some(ConsultationStatus::Cancelled),
            "no-show" => Some(ConsultationStatus::NoShow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "sent" => Some(InvoiceStatus::Sent),
            "paid" => Some(InvoiceStatus::Paid),
            "overdue" => Some(InvoiceStatus::Overdue),
            _ => None,
        }
    }
}

/// Filing category of an uploaded document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentCategory {
    Contract,
    Evidence,
    Correspondence,
    CourtFiling,
    Identification,
    Financial,
    Other,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Contract => "contract",
            DocumentCategory::Evidence => "evidence",
            DocumentCategory::Correspondence => "correspondence",
            DocumentCategory::CourtFiling => "court-filing",
            DocumentCategory::Identification => "identification",
            DocumentCategory::Financial => "financial",
            DocumentCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contract" => Some(DocumentCategory::Contract),
            "evidence" => Some(DocumentCategory::Evidence),
            "correspondence" => Some(DocumentCategory::Correspondence),
            "court-filing" => Some(DocumentCategory::CourtFiling),
            "identification" => Some(DocumentCategory::Identification),
            "financial" => Some(DocumentCategory::Financial),
            "other" => Some(DocumentCategory::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationDirection {
    Inbound,
    Outbound,
}

impl CommunicationDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommunicationDirection::Inbound => "inbound",
            CommunicationDirection::Outbound => "outbound",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(CommunicationDirection::Inbound),
            "outbound" => Some(CommunicationDirection::Outbound),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationStatus {
    Sent,
    Failed,
    Received,
}

impl CommunicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommunicationStatus::Sent => "sent",
            CommunicationStatus::Failed => "failed",
            CommunicationStatus::Received => "received",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(CommunicationStatus::Sent),
            "failed" => Some(CommunicationStatus::Failed),
            "received" => Some(CommunicationStatus::Received),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An administrative staff account.  The password hash never leaves the
/// server: it is skipped during serialization.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub profile_photo: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A person represented by the firm.  Aggregation root for cases,
/// consultations, invoices, documents, portal tokens, and communications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Case
// ---------------------------------------------------------------------------

/// A legal matter.  Never hard-deleted; closed via status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: Uuid,
    pub client_id: Uuid,
    pub title: String,
    pub case_type: String,
    pub status: CaseStatus,
    pub description: Option<String>,
    pub total_fees: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Consultation
// ---------------------------------------------------------------------------

/// A scheduled meeting, booked publicly or by an admin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: Uuid,
    pub client_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ConsultationKind,
    pub case_type: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: ConsultationStatus,
    pub rate: Option<f64>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Invoice
// ---------------------------------------------------------------------------

/// One line on an invoice.  Stored inside the invoice row as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLineItem {
    pub description: String,
    pub quantity: f64,
    pub rate: f64,
    pub amount: f64,
}

/// A billing document.  `total_amount` is fixed at creation (amount + tax)
/// and intentionally not re-derived afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub client_id: Uuid,
    pub invoice_number: String,
    pub amount: f64,
    pub tax: f64,
    pub total_amount: f64,
    pub status: InvoiceStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub line_items: Vec<InvoiceLineItem>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Document (metadata; bytes live on disk)
// ---------------------------------------------------------------------------

/// Metadata for an uploaded file.  Owns exactly one on-disk blob whose path
/// is derived from `client_id` / `case_id` / `filename`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    /// Storage-internal name: `<uuid><ext>`.
    pub filename: String,
    /// The name the file was uploaded under; used for Content-Disposition.
    pub original_name: String,
    /// Blob location relative to the upload root.  Fixed at upload time, so
    /// the blob stays reachable after `client_id`/`case_id` are nulled by a
    /// client or case deletion.  Server-internal; never serialized.
    #[serde(skip)]
    pub storage_path: String,
    pub size: i64,
    pub mime_type: String,
    pub client_id: Option<Uuid>,
    pub case_id: Option<Uuid>,
    pub category: DocumentCategory,
    pub description: Option<String>,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Client portal token
// ---------------------------------------------------------------------------

/// Opaque, time-limited credential letting an unauthenticated client view
/// their own portal data.  Valid iff `expires_at > now`; no early revocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientToken {
    pub id: Uuid,
    pub client_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Communication
// ---------------------------------------------------------------------------

/// One entry in the per-client correspondence log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Communication {
    pub id: Uuid,
    pub client_id: Uuid,
    pub direction: CommunicationDirection,
    pub channel: String,
    pub subject: String,
    pub body: String,
    pub status: CommunicationStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// AI chat session
// ---------------------------------------------------------------------------

/// One turn in an AI chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Conversation state for the website assistant, keyed by a client-generated
/// session id.  Created lazily on the first message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AiChatSession {
    pub session_id: String,
    pub client_email: Option<String>,
    pub messages: Vec<ChatTurn>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// Append-only record of a privileged or notable action.  `details` is
/// sanitized before it reaches the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub status: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Row-mapping helpers
// ---------------------------------------------------------------------------

/// Build a `rusqlite` conversion error for a TEXT column holding an
/// unrecognized enum value.
pub(crate) fn enum_parse_err(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unrecognized enum value '{value}'").into(),
    )
}

/// Parse a TEXT column into a `Uuid`.
pub(crate) fn uuid_col(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse an RFC-3339 TEXT column into a UTC timestamp.
pub(crate) fn timestamp_col(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
