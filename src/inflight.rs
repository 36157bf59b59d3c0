//! In-flight guard for mutating backend calls.
//!
//! Saving, disputing, approving and retraining are not idempotent on the
//! server. A second request for the same record while the first is still
//! outstanding would either double-write or come back as a confusing
//! conflict, so every mutating workflow call holds an [`OperationGuard`]
//! for its duration.
//!
//! - Guards are keyed by operation kind and record, so unrelated records
//!   never block each other.
//! - `try_acquire()` never blocks: a busy key surfaces as `WorkflowError::Busy`.
//! - `current_operations()` reports what is outstanding.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::error::WorkflowError;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Which mutating call is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Persisting a predicted stroke risk
    SaveStrokeRecord,
    /// Persisting a CT classification
    SaveScan,
    /// Submitting a misclassification report
    DisputeScan,
    /// Supervisor approval of a pending correction
    ApproveCorrection,
    /// CT model retraining (one per backend)
    Retrain,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SaveStrokeRecord => write!(f, "Saving the stroke record"),
            Self::SaveScan => write!(f, "Saving the CT scan"),
            Self::DisputeScan => write!(f, "Reporting the misclassification"),
            Self::ApproveCorrection => write!(f, "Approving the correction"),
            Self::Retrain => write!(f, "Retraining"),
        }
    }
}

/// Snapshot of one outstanding call.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveOperation {
    pub kind: OperationKind,
    /// Patient id, correction id, or `"model"` for retraining.
    pub record: String,
    /// When the call started (ISO 8601).
    pub started_at: String,
}

type OperationKey = (OperationKind, String);

// ═══════════════════════════════════════════════════════════
// OperationGate
// ═══════════════════════════════════════════════════════════

/// Registry of outstanding mutating calls.
pub struct OperationGate {
    active: Mutex<HashMap<OperationKey, ActiveOperation>>,
}

impl OperationGate {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Claim `(kind, record)` without blocking.
    ///
    /// Returns `None` if the same call is already outstanding for this record.
    /// The claim lasts until the guard is dropped.
    pub fn try_acquire(&self, kind: OperationKind, record: &str) -> Option<OperationGuard<'_>> {
        let key = (kind, record.to_string());
        let mut active = self.lock();
        if active.contains_key(&key) {
            return None;
        }
        active.insert(
            key.clone(),
            ActiveOperation {
                kind,
                record: record.to_string(),
                started_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        Some(OperationGuard { gate: self, key })
    }

    /// [`try_acquire`](Self::try_acquire), failing with `WorkflowError::Busy`.
    pub fn claim(&self, kind: OperationKind, record: &str) -> Result<OperationGuard<'_>, WorkflowError> {
        self.try_acquire(kind, record).ok_or_else(|| {
            tracing::warn!(%kind, record, "Rejected overlapping request");
            WorkflowError::Busy(kind.to_string())
        })
    }

    pub fn is_busy(&self, kind: OperationKind, record: &str) -> bool {
        self.lock().contains_key(&(kind, record.to_string()))
    }

    pub fn current_operations(&self) -> Vec<ActiveOperation> {
        let mut ops: Vec<_> = self.lock().values().cloned().collect();
        ops.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        ops
    }

    // ── Internal ────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, HashMap<OperationKey, ActiveOperation>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, key: &OperationKey) {
        self.lock().remove(key);
    }
}

impl Default for OperationGate {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// OperationGuard
// ═══════════════════════════════════════════════════════════

/// Dropping the guard releases the claim.
pub struct OperationGuard<'a> {
    gate: &'a OperationGate,
    key: OperationKey,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.gate.release(&self.key);
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
