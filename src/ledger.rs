//! Pending misclassification corrections awaiting supervisor approval.
//!
//! Approval is optimistic: the entry leaves the local list before the call,
//! and any failure re-fetches the authoritative list instead of trusting the
//! local removal. Approved ids are remembered for the session so a stale
//! server listing cannot bring them back.

use std::collections::HashSet;

use crate::api::ClinicalApi;
use crate::error::WorkflowError;
use crate::inflight::{OperationGate, OperationKind};
use crate::models::{CorrectionRequest, CorrectionStatus, ScanLabel};

pub struct CorrectionLedger<'a> {
    api: &'a dyn ClinicalApi,
    operations: &'a OperationGate,
    pending: Vec<CorrectionRequest>,
    resolved: HashSet<u64>,
}

impl<'a> CorrectionLedger<'a> {
    pub fn new(api: &'a dyn ClinicalApi, operations: &'a OperationGate) -> Self {
        Self {
            api,
            operations,
            pending: Vec::new(),
            resolved: HashSet::new(),
        }
    }

    /// Fetch every pending correction across patients.
    pub fn list_pending(&mut self) -> Result<&[CorrectionRequest], WorkflowError> {
        self.pending = self.fetch_pending()?;
        tracing::debug!(count = self.pending.len(), "Pending corrections loaded");
        Ok(&self.pending)
    }

    /// The list as of the last fetch or approval.
    pub fn pending(&self) -> &[CorrectionRequest] {
        &self.pending
    }

    /// Resolve one pending correction, writing `final_label` (or the
    /// request's own proposed label) into the canonical store.
    pub fn approve(
        &mut self,
        request_id: u64,
        final_label: Option<ScanLabel>,
    ) -> Result<CorrectionRequest, WorkflowError> {
        let index = self
            .pending
            .iter()
            .position(|r| r.request_id == Some(request_id))
            .ok_or_else(|| WorkflowError::NotFound(format!("No pending correction with id {request_id}.")))?;

        let operations = self.operations;
        let _guard = operations.claim(OperationKind::ApproveCorrection, &request_id.to_string())?;

        let entry = self.pending.remove(index);
        let label = final_label.unwrap_or(entry.correct_label);

        if let Err(e) = self.api.approve_misclassification(request_id, label) {
            tracing::warn!(request_id, error = %e, "Approval failed; reconciling pending list");
            self.reconcile(index, entry);
            return Err(e.into());
        }

        tracing::info!(
            request_id,
            patient_id = %entry.patient_id,
            %label,
            "Correction approved"
        );
        self.resolved.insert(request_id);
        Ok(CorrectionRequest {
            correct_label: label,
            status: CorrectionStatus::Resolved,
            ..entry
        })
    }

    fn fetch_pending(&self) -> Result<Vec<CorrectionRequest>, WorkflowError> {
        let rows = self.api.list_misclassified()?;
        let mut pending = Vec::with_capacity(rows.len());
        for row in rows {
            if self.resolved.contains(&row.id) {
                continue;
            }
            let id = row.id;
            match CorrectionRequest::try_from(row) {
                Ok(request) => pending.push(request),
                Err(e) => tracing::warn!(id, error = %e, "Skipping correction with unknown label"),
            }
        }
        Ok(pending)
    }

    /// After a failed approval, trust the server's list. If even that is
    /// unreachable, put the entry back where it was.
    fn reconcile(&mut self, index: usize, entry: CorrectionRequest) {
        match self.fetch_pending() {
            Ok(pending) => self.pending = pending,
            Err(e) => {
                tracing::warn!(error = %e, "Could not re-fetch pending corrections; restoring entry");
                self.pending.insert(index.min(self.pending.len()), entry);
            }
        }
    }
}
