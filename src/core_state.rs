//! Explicit session context shared by every workflow.
//!
//! `CoreState` is built once per client instance. It owns the active patient
//! context, the backend handle and the in-flight operation registry, and
//! hands workflows out by reference. A workflow borrows the patient context,
//! so the active patient cannot change underneath it; switching patients
//! means dropping the workflow first.

use std::sync::Arc;

use crate::api::{ClinicalApi, HttpClinicalApi};
use crate::config::{self, ClientConfig};
use crate::error::WorkflowError;
use crate::identity::{ContextStorage, FileContextStorage, PatientIdentityStore};
use crate::inflight::{ActiveOperation, OperationGate};
use crate::insight::InsightSession;
use crate::ledger::CorrectionLedger;
use crate::models::{NewPatient, PatientContext};
use crate::prediction::PredictionWorkflow;
use crate::readiness::{InsightPass, ReadinessGate};
use crate::retraining::RetrainingTrigger;
use crate::scan::ScanClassificationWorkflow;

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    config: ClientConfig,
    /// Backend transport. `Arc` so embedders can keep their own handle.
    api: Arc<dyn ClinicalApi>,
    /// Active patient and its durable mirror.
    identity: PatientIdentityStore,
    /// Outstanding save/dispute/approve/retrain calls.
    operations: OperationGate,
}

impl CoreState {
    pub fn new(config: ClientConfig, api: Arc<dyn ClinicalApi>, storage: Box<dyn ContextStorage>) -> Self {
        Self {
            config,
            api,
            identity: PatientIdentityStore::new(storage),
            operations: OperationGate::new(),
        }
    }

    /// HTTP backend at `config.base_url`, context mirrored under the app data dir.
    pub fn from_config(config: ClientConfig) -> Result<Self, WorkflowError> {
        let api = HttpClinicalApi::from_config(&config)?;
        tracing::info!(base_url = api.base_url(), "Clinical backend configured");
        let storage = FileContextStorage::new(config::context_file());
        Ok(Self::new(config, Arc::new(api), Box::new(storage)))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &dyn ClinicalApi {
        self.api.as_ref()
    }

    pub fn active_operations(&self) -> Vec<ActiveOperation> {
        self.operations.current_operations()
    }

    // ── Patient identity ────────────────────────────────────

    pub fn patient(&self) -> Option<&PatientContext> {
        self.identity.get()
    }

    pub fn resolve_patient(&mut self, query: &str) -> Result<&PatientContext, WorkflowError> {
        self.identity.resolve(self.api.as_ref(), query)
    }

    pub fn register_patient(&mut self, patient: NewPatient) -> Result<&PatientContext, WorkflowError> {
        self.identity.register(self.api.as_ref(), patient)
    }

    pub fn set_patient(&mut self, context: PatientContext) -> Result<&PatientContext, WorkflowError> {
        self.identity.set(context)
    }

    pub fn attach_doctor(&mut self, username: &str) -> Result<bool, WorkflowError> {
        self.identity.attach_doctor(username)
    }

    pub fn clear_patient(&mut self) -> Result<(), WorkflowError> {
        self.identity.clear()
    }

    // ── Workflows ───────────────────────────────────────────

    pub fn prediction_workflow(&self) -> Result<PredictionWorkflow<'_>, WorkflowError> {
        let patient = self.identity.require()?;
        Ok(PredictionWorkflow::new(self.api.as_ref(), &self.operations, patient))
    }

    pub fn scan_workflow(&self) -> Result<ScanClassificationWorkflow<'_>, WorkflowError> {
        let patient = self.identity.require()?;
        Ok(ScanClassificationWorkflow::new(self.api.as_ref(), &self.operations, patient))
    }

    pub fn readiness_gate(&self) -> ReadinessGate<'_> {
        ReadinessGate::new(self.api.as_ref())
    }

    /// Gate the active patient and open their assistant session.
    pub fn open_insight(&self) -> Result<InsightSession<'_>, WorkflowError> {
        let patient = self.identity.require()?;
        let pass = self.readiness_gate().admit(&patient.patient_id)?;
        Ok(self.insight_session(pass))
    }

    pub fn insight_session(&self, pass: InsightPass) -> InsightSession<'_> {
        InsightSession::for_patient(self.api.as_ref(), pass)
    }

    /// Assistant without a patient: questions only.
    pub fn assistant_session(&self) -> InsightSession<'_> {
        InsightSession::general(self.api.as_ref())
    }

    pub fn correction_ledger(&self) -> CorrectionLedger<'_> {
        CorrectionLedger::new(self.api.as_ref(), &self.operations)
    }

    pub fn retraining_trigger(&self) -> RetrainingTrigger<'_> {
        RetrainingTrigger::new(self.api.as_ref(), &self.operations, &self.config)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Endpoint, MockClinicalApi};
    use crate::error::ErrorKind;
    use crate::identity::MemoryContextStorage;
    use crate::models::{MessageKind, PatientRecord, RetrainConfig, ScanImage, ScanLabel, ScanStatus};

    fn record(patient_id: &str) -> PatientRecord {
        PatientRecord {
            patient_id: patient_id.into(),
            id_number: format!("90010150090{patient_id}"),
            name: "Thandi Nkosi".into(),
            gender: "Female".into(),
            phone: "0821234567".into(),
            age: 61,
        }
    }

    fn state_with(api: MockClinicalApi) -> (CoreState, Arc<MockClinicalApi>) {
        let api = Arc::new(api);
        let state = CoreState::new(
            ClientConfig {
                progress_tick_ms: 2,
                ..ClientConfig::default()
            },
            api.clone(),
            Box::new(MemoryContextStorage::default()),
        );
        (state, api)
    }

    #[test]
    fn workflows_require_active_patient() {
        let (state, api) = state_with(MockClinicalApi::new());
        assert_eq!(state.prediction_workflow().err().unwrap().kind(), ErrorKind::Validation);
        assert_eq!(state.scan_workflow().err().unwrap().kind(), ErrorKind::Validation);
        assert_eq!(state.open_insight().err().unwrap().kind(), ErrorKind::Validation);
        assert_eq!(api.total_calls(), 0);
    }

    #[test]
    fn full_patient_journey() {
        let (mut state, api) = state_with(
            MockClinicalApi::new()
                .with_patient(record("42"))
                .with_risk(64.2)
                .with_label("Ischemic"),
        );
        state.resolve_patient("42").unwrap();
        state.attach_doctor("dr.mokoena").unwrap();

        // Not ready yet: gate denies and the assistant is never called.
        let err = state.open_insight().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::GateDenied);

        let mut prediction = state.prediction_workflow().unwrap();
        let symptoms = prediction.default_symptoms();
        prediction.predict(symptoms).unwrap();
        prediction.save().unwrap();

        let mut scan = state.scan_workflow().unwrap();
        scan.classify(ScanImage::new("ct_042.png", vec![1, 2, 3])).unwrap();
        scan.save().unwrap();
        assert_eq!(scan.status(), ScanStatus::Saved);

        let mut session = state.open_insight().unwrap();
        assert!(session.activate());
        assert_eq!(session.transcript()[0].kind, MessageKind::Summary);
        assert!(session.transcript()[0].text.contains("CT Classification: Ischemic"));

        assert_eq!(api.saved_symptoms("42").unwrap().doctor_username, "dr.mokoena");
        assert_eq!(api.saved_scan("42").unwrap().doctor_username, "dr.mokoena");
        assert_eq!(api.calls(Endpoint::ClinicalInsight), 1);
        assert!(state.active_operations().is_empty());
    }

    #[test]
    fn dispute_approve_retrain_cycle() {
        let api = (0..4).fold(MockClinicalApi::new(), |api, i| {
            api.with_saved_scan(&format!("seed{i}"), ScanLabel::Normal)
        });
        let (mut state, api) = state_with(api.with_patient(record("42")).with_label("Ischemic"));
        state.resolve_patient("42").unwrap();

        let mut scan = state.scan_workflow().unwrap();
        scan.classify(ScanImage::new("ct_042.png", vec![1])).unwrap();
        let request = scan.dispute("Hemorrhagic").unwrap();

        let mut trigger = state.retraining_trigger();
        assert_eq!(trigger.refresh_stats().unwrap().total, 4);
        assert!(trigger.retrain(&RetrainConfig::default()).is_err());

        let mut ledger = state.correction_ledger();
        ledger.list_pending().unwrap();
        ledger.approve(request.request_id.unwrap(), None).unwrap();
        assert!(ledger.list_pending().unwrap().is_empty());

        assert_eq!(trigger.refresh_stats().unwrap().total, 5);
        trigger.retrain(&RetrainConfig::default()).unwrap();
        assert_eq!(api.calls(Endpoint::Retrain), 1);
        assert_eq!(trigger.progress().value(), 100);
    }

    #[test]
    fn switching_patient_replaces_context() {
        let (mut state, _api) = state_with(
            MockClinicalApi::new()
                .with_patient(record("41"))
                .with_patient(record("42")),
        );
        state.resolve_patient("41").unwrap();
        state.attach_doctor("dr.mokoena").unwrap();
        state.resolve_patient("42").unwrap();

        let workflow = state.prediction_workflow().unwrap();
        assert_eq!(workflow.patient().patient_id, "42");
        assert!(!workflow.patient().has_doctor());
    }

    #[test]
    fn http_backend_with_memory_context() {
        let config = ClientConfig {
            base_url: "http://127.0.0.1:8000/".into(),
            ..ClientConfig::default()
        };
        let api = HttpClinicalApi::from_config(&config).unwrap();
        assert_eq!(api.base_url(), "http://127.0.0.1:8000");

        let state = CoreState::new(config, Arc::new(api), Box::new(MemoryContextStorage::default()));
        assert_eq!(state.config().min_retrain_samples, 5);
        assert!(state.patient().is_none());
        assert!(state.active_operations().is_empty());
    }
}
