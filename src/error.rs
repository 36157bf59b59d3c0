//! Workflow-level error taxonomy.
//!
//! Every failure a caller can observe collapses onto one of four kinds:
//! validation (blocked locally, no call issued), conflict (server refused a
//! duplicate), network (transport failure or unstructured response) and
//! gate denial (assistant access blocked). All of them are terminal for the
//! action that raised them; nothing here is retried automatically.

use serde::Serialize;

use crate::api::{ApiError, ConflictCode};
use crate::identity::StorageError;
use crate::readiness::MissingPrerequisite;

/// Generic message for transport failures. The underlying cause is logged,
/// not shown.
const NETWORK_MESSAGE: &str = "Could not reach the clinical server. Please try again.";

/// Coarse classification used by callers to pick a presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    Network,
    GateDenied,
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A local precondition is unmet. Raised before any network call.
    #[error("{0}")]
    Validation(String),

    /// Retraining refused below the eligible-sample threshold.
    #[error("Need at least {required} eligible scans to retrain the model (currently {total}).")]
    InsufficientSamples { total: u32, required: u32 },

    /// The server rejected a duplicate save/dispute/approve. Detail is verbatim.
    #[error("{detail}")]
    Conflict { code: ConflictCode, detail: String },

    /// A mutating call for the same record is still outstanding.
    #[error("{0} is already in progress for this record")]
    Busy(String),

    #[error("{0}")]
    NotFound(String),

    /// Transport failure or an unstructured non-success response.
    #[error("Network error: {0}")]
    Network(String),

    /// Structured server-side failure (5xx with a detail body).
    #[error("Server error: {0}")]
    ServerFault(String),

    #[error("{}", .missing.message())]
    GateDenied {
        patient_id: String,
        missing: MissingPrerequisite,
    },

    #[error("Patient context storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InsufficientSamples { .. } => ErrorKind::Validation,
            Self::Conflict { .. } | Self::Busy(_) => ErrorKind::Conflict,
            Self::Network(_) | Self::ServerFault(_) | Self::Storage(_) => ErrorKind::Network,
            Self::GateDenied { .. } => ErrorKind::GateDenied,
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Text suitable for an inline message or alert.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => NETWORK_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<ApiError> for WorkflowError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Conflict { code, detail } => Self::Conflict { code, detail },
            ApiError::Rejected {
                status,
                detail: Some(detail),
            } => match status {
                404 => Self::NotFound(detail),
                400..=499 => Self::Validation(detail),
                _ => Self::ServerFault(detail),
            },
            ApiError::Rejected {
                status,
                detail: None,
            } => Self::Network(format!("server returned status {status}")),
            ApiError::Connection(url) => Self::Network(format!("cannot connect to {url}")),
            ApiError::Timeout(secs) => Self::Network(format!("request timed out after {secs}s")),
            ApiError::Http(msg) => Self::Network(msg),
            ApiError::ResponseParsing(msg) => Self::Network(format!("unexpected response: {msg}")),
        }
    }
}
