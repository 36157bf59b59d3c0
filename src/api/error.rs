//! Transport-level errors and the rejection classifier.

use serde::{Deserialize, Serialize};

/// Why the server refused a mutating call as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictCode {
    /// A record of this artifact type is already saved for the patient.
    AlreadySaved,
    /// A correction was already submitted for this scan.
    DuplicateCorrection,
    /// A pending correction blocks saving the scan.
    PendingCorrection,
    /// The server answered 409 without a recognisable reason.
    Other,
}

/// Errors from the REST client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Cannot connect to {0}")]
    Connection(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("HTTP client error: {0}")]
    Http(String),
    /// Non-success status. `detail` is the server's `{detail}` body, if any.
    #[error("Server rejected request ({status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Rejected { status: u16, detail: Option<String> },
    #[error("{detail}")]
    Conflict { code: ConflictCode, detail: String },
    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
}

/// Turn a non-success response into a structured error.
///
/// This is the only place that inspects server wording. 409 is always a
/// conflict; for endpoints that report duplicates as 400/500 with free
/// text, the "already ..." phrasing is mapped onto a [`ConflictCode`].
pub fn classify_rejection(status: u16, detail: Option<String>) -> ApiError {
    let code = detail.as_deref().and_then(conflict_code_from_detail);

    match (status, code, detail) {
        (409, code, detail) => ApiError::Conflict {
            code: code.unwrap_or(ConflictCode::Other),
            detail: detail.unwrap_or_else(|| "Record already exists.".to_string()),
        },
        (_, Some(code), Some(detail)) => ApiError::Conflict { code, detail },
        (status, _, detail) => ApiError::Rejected { status, detail },
    }
}

fn conflict_code_from_detail(detail: &str) -> Option<ConflictCode> {
    let lower = detail.to_lowercase();
    if lower.contains("already reported") {
        Some(ConflictCode::DuplicateCorrection)
    } else if lower.contains("pending misclassification") {
        Some(ConflictCode::PendingCorrection)
    } else if lower.contains("already been saved") || lower.contains("already exists") {
        Some(ConflictCode::AlreadySaved)
    } else {
        None
    }
}

/// Strip decoration the backend prefixes onto its messages (status echoes
/// such as `"400: "` and emoji markers) so the detail reads cleanly.
///
/// ASCII punctuation is part of the message and is kept.
pub fn clean_detail(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_status = match trimmed.split_once(": ") {
        Some((code, rest)) if code.len() == 3 && code.bytes().all(|b| b.is_ascii_digit()) => rest,
        _ => trimmed,
    };
    without_status
        .trim_start_matches(|c: char| c.is_whitespace() || (!c.is_ascii() && !c.is_alphanumeric()))
        .to_string()
}
