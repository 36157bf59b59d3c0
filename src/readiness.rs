//! Assistant access gate.
//!
//! A patient-scoped assistant session needs both a saved stroke record and
//! a saved CT record on the server. Readiness is fetched on every check and
//! never cached; any failure counts as not ready.

use serde::Serialize;

use crate::api::ClinicalApi;
use crate::error::WorkflowError;

/// What keeps a patient from the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPrerequisite {
    StrokeRecord,
    CtRecord,
    Both,
    /// The check itself failed, so nothing is known.
    Unverified,
}

impl MissingPrerequisite {
    pub fn message(&self) -> &'static str {
        match self {
            Self::StrokeRecord => {
                "Please save the patient's stroke risk prediction before opening the assistant."
            }
            Self::CtRecord => "Please save the patient's CT scan classification before opening the assistant.",
            Self::Both => {
                "Please save the patient's stroke risk prediction and CT scan classification \
                 before opening the assistant."
            }
            Self::Unverified => {
                "Could not verify that the patient's stroke and CT records are saved. Please try again."
            }
        }
    }
}

/// Proof that readiness was confirmed for one patient. Only [`ReadinessGate::admit`]
/// creates one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightPass {
    patient_id: String,
}

impl InsightPass {
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }
}

pub struct ReadinessGate<'a> {
    api: &'a dyn ClinicalApi,
}

impl<'a> ReadinessGate<'a> {
    pub fn new(api: &'a dyn ClinicalApi) -> Self {
        Self { api }
    }

    /// Fresh readiness for `patient_id`. A failed check reads as `false`.
    pub fn check_readiness(&self, patient_id: &str) -> bool {
        match self.api.check_readiness(patient_id) {
            Ok(ready) => {
                tracing::debug!(patient_id, ready, "Readiness checked");
                ready
            }
            Err(e) => {
                tracing::warn!(patient_id, error = %e, "Readiness check failed; treating as not ready");
                false
            }
        }
    }

    /// Check readiness and hand out a pass, or deny naming what is missing.
    pub fn admit(&self, patient_id: &str) -> Result<InsightPass, WorkflowError> {
        let patient_id = patient_id.trim();
        if patient_id.is_empty() {
            return Err(WorkflowError::Validation("No patient selected.".into()));
        }

        let missing = match self.api.check_readiness(patient_id) {
            Ok(true) => {
                tracing::info!(patient_id, "Assistant access granted");
                return Ok(InsightPass {
                    patient_id: patient_id.to_string(),
                });
            }
            Ok(false) => self.missing_prerequisite(patient_id),
            Err(e) => {
                tracing::warn!(patient_id, error = %e, "Readiness check failed; denying access");
                MissingPrerequisite::Unverified
            }
        };

        tracing::info!(patient_id, ?missing, "Assistant access denied");
        Err(WorkflowError::GateDenied {
            patient_id: patient_id.to_string(),
            missing,
        })
    }

    fn missing_prerequisite(&self, patient_id: &str) -> MissingPrerequisite {
        let stroke = self.api.has_symptom_record(patient_id);
        let ct = self.api.has_ct_record(patient_id);
        match (stroke, ct) {
            (Ok(false), Ok(true)) => MissingPrerequisite::StrokeRecord,
            (Ok(true), Ok(false)) => MissingPrerequisite::CtRecord,
            // Both present but not ready, both absent, or a probe failed.
            _ => MissingPrerequisite::Both,
        }
    }
}
