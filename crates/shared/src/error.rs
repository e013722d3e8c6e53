//! Shared error types including RFC7807 Problem Details.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RFC7807 Problem Details (application/problem+json)
///
/// The dev server answers every failed `/api/*` request with this envelope so
/// the poller can log something more useful than a bare status code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub type_url: String,
    /// A short, human-readable summary of the problem type.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProblemDetails {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            type_url: "https://kycwatch.dev/problems/bad-request".to_string(),
            title: "Bad Request".to_string(),
            status: 400,
            detail: Some(detail.into()),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self {
            type_url: "https://kycwatch.dev/problems/not-found".to_string(),
            title: "Not Found".to_string(),
            status: 404,
            detail: Some(detail.into()),
        }
    }
}

/// Attempt to parse an RFC7807 JSON body into a user-facing message.
/// Prefers `detail`, falls back to `title`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ProblemDetails>(body).ok()?;
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    if !parsed.title.trim().is_empty() {
        return Some(parsed.title);
    }
    None
}

fn problem_or_body(body: &str) -> String {
    try_problem_detail(body).unwrap_or_else(|| body.to_string())
}

/// Failure of a REST call made by the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {}", problem_or_body(.body))]
    Http { status: u16, body: String },
    #[error("deserialization error: {0}")]
    Deserialize(String),
}
