//! KYC payload models carried in the `data` field of notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Review status of a single KYC document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Verified,
    Rejected,
    Flagged,
    Expired,
}

/// Payload of the `document_*` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycDocument {
    pub id: String,
    pub investor_id: String,
    pub document_type: String,
    pub status: DocumentStatus,
    /// Reviewer note for rejected or flagged documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Overall KYC standing of an investor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycLevel {
    NotStarted,
    InReview,
    Approved,
    Rejected,
}

/// Payload of `kyc_update`, and the body returned by the polling endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycStatus {
    pub investor_id: String,
    pub level: KycLevel,
    #[serde(default)]
    pub documents: Vec<KycDocument>,
    pub updated_at: DateTime<Utc>,
}

/// Payload of `expiry_alert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiryAlert {
    pub document_id: String,
    pub investor_id: String,
    pub expires_at: DateTime<Utc>,
    pub days_remaining: i64,
}
