//! In-memory stand-in for the clinical backend.
//!
//! Applies the backend's own rules (one saved record per patient and
//! artifact, one correction per patient, approval moves the scan into the
//! canonical store, stats count scans not yet used for training) and counts
//! calls per endpoint so callers can assert what went over the wire.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::error::{ApiError, ConflictCode};
use super::types::*;
use super::ClinicalApi;
use crate::models::{
    ClassCounts, MisclassifiedScan, NewPatient, PatientRecord, RetrainConfig, RetrainOutcome,
    RetrainStats, ScanImage, ScanLabel, SymptomVector,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListPatients,
    RegisterPatient,
    PredictStroke,
    SaveSymptoms,
    PredictCtScan,
    SaveCtScan,
    ReportMisclassification,
    CheckReadiness,
    PatientSymptoms,
    PatientCtScans,
    ListMisclassified,
    ApproveMisclassification,
    RetrainStats,
    Retrain,
    ClinicalInsight,
    Ask,
}

/// A CT record in the canonical classification store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredScan {
    pub file_name: String,
    pub classification: ScanLabel,
    pub doctor_username: String,
    pub model_training: String,
}

struct MockState {
    patients: Vec<PatientRecord>,
    next_patient_id: u64,
    symptoms: HashMap<String, SaveSymptomsRequest>,
    ct_scans: HashMap<String, StoredScan>,
    misclassified: Vec<MisclassifiedScan>,
    next_correction_id: u64,
    risk: f64,
    label: String,
    stats_override: Option<RetrainStats>,
    retrain_outcome: RetrainOutcome,
    retrain_delay: Duration,
    insight: Option<InsightResponse>,
    answer: AskResponse,
    failures: HashMap<Endpoint, ApiError>,
    calls: HashMap<Endpoint, usize>,
}

/// Mock clinical backend for testing.
pub struct MockClinicalApi {
    state: Mutex<MockState>,
}

impl Default for MockClinicalApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClinicalApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                patients: Vec::new(),
                next_patient_id: 1000,
                symptoms: HashMap::new(),
                ct_scans: HashMap::new(),
                misclassified: Vec::new(),
                next_correction_id: 1,
                risk: 42.0,
                label: ScanLabel::Normal.as_str().to_string(),
                stats_override: None,
                retrain_outcome: RetrainOutcome {
                    message: Some("Model retrained successfully.".into()),
                    external_accuracy: None,
                },
                retrain_delay: Duration::ZERO,
                insight: None,
                answer: AskResponse {
                    answer: Some("No guideline found.".into()),
                    source: None,
                    error: None,
                },
                failures: HashMap::new(),
                calls: HashMap::new(),
            }),
        }
    }

    // ── Configuration ───────────────────────────────────────

    pub fn with_patient(self, record: PatientRecord) -> Self {
        self.lock().patients.push(record);
        self
    }

    pub fn with_risk(self, risk: f64) -> Self {
        self.lock().risk = risk;
        self
    }

    pub fn with_label(self, label: &str) -> Self {
        self.lock().label = label.to_string();
        self
    }

    /// Report these stats instead of deriving them from the store.
    pub fn with_stats(self, stats: RetrainStats) -> Self {
        self.lock().stats_override = Some(stats);
        self
    }

    pub fn with_retrain_outcome(self, outcome: RetrainOutcome) -> Self {
        self.lock().retrain_outcome = outcome;
        self
    }

    pub fn with_retrain_delay(self, delay: Duration) -> Self {
        self.lock().retrain_delay = delay;
        self
    }

    /// Fixed insight answer. Without one, the mock builds a summary from
    /// the saved records the way the backend does.
    pub fn with_insight(self, insight: InsightResponse) -> Self {
        self.lock().insight = Some(insight);
        self
    }

    pub fn with_answer(self, answer: AskResponse) -> Self {
        self.lock().answer = answer;
        self
    }

    pub fn with_saved_scan(self, patient_id: &str, label: ScanLabel) -> Self {
        self.lock().ct_scans.insert(
            patient_id.to_string(),
            StoredScan {
                file_name: format!("{patient_id}_seed.png"),
                classification: label,
                doctor_username: "seed".into(),
                model_training: NOT_USED_FOR_TRAINING.into(),
            },
        );
        self
    }

    pub fn with_saved_symptoms(self, patient_id: &str) -> Self {
        self.lock().symptoms.insert(
            patient_id.to_string(),
            SaveSymptomsRequest {
                symptoms: SymptomVector::default(),
                patient_id: patient_id.to_string(),
                id_number: String::new(),
                stroke_risk: 0,
                doctor_username: "seed".into(),
            },
        );
        self
    }

    /// Make every call to `endpoint` fail with `error` until cleared.
    pub fn fail(&self, endpoint: Endpoint, error: ApiError) {
        self.lock().failures.insert(endpoint, error);
    }

    pub fn clear_failure(&self, endpoint: Endpoint) {
        self.lock().failures.remove(&endpoint);
    }

    // ── Inspection ──────────────────────────────────────────

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn saved_scan(&self, patient_id: &str) -> Option<StoredScan> {
        self.lock().ct_scans.get(patient_id).cloned()
    }

    pub fn saved_symptoms(&self, patient_id: &str) -> Option<SaveSymptomsRequest> {
        self.lock().symptoms.get(patient_id).cloned()
    }

    pub fn pending_corrections(&self) -> Vec<MisclassifiedScan> {
        self.lock().misclassified.clone()
    }

    /// List a correction row as pending, whatever its state.
    pub fn insert_correction(&self, row: MisclassifiedScan) {
        self.lock().misclassified.push(row);
    }

    /// Drop a pending correction behind the client's back.
    pub fn remove_correction(&self, request_id: u64) {
        self.lock().misclassified.retain(|m| m.id != request_id);
    }

    // ── Internal ────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not cascade into unrelated assertions.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call and return the injected failure, if any.
    fn enter(&self, endpoint: Endpoint) -> Result<MutexGuard<'_, MockState>, ApiError> {
        let mut state = self.lock();
        *state.calls.entry(endpoint).or_insert(0) += 1;
        if let Some(err) = state.failures.get(&endpoint).cloned() {
            return Err(err);
        }
        Ok(state)
    }

    fn derived_stats(state: &MockState) -> RetrainStats {
        let mut by_class = ClassCounts::default();
        let mut total = 0;
        for scan in state.ct_scans.values() {
            if scan.model_training == NOT_USED_FOR_TRAINING {
                by_class.increment(scan.classification);
                total += 1;
            }
        }
        RetrainStats { total, by_class }
    }
}

fn rejected(status: u16, detail: &str) -> ApiError {
    ApiError::Rejected {
        status,
        detail: Some(detail.to_string()),
    }
}

fn conflict(code: ConflictCode, detail: &str) -> ApiError {
    ApiError::Conflict {
        code,
        detail: detail.to_string(),
    }
}

impl ClinicalApi for MockClinicalApi {
    fn list_patients(&self) -> Result<Vec<PatientRecord>, ApiError> {
        Ok(self.enter(Endpoint::ListPatients)?.patients.clone())
    }

    fn register_patient(&self, patient: &NewPatient) -> Result<String, ApiError> {
        let mut state = self.enter(Endpoint::RegisterPatient)?;
        let mismatch = state.patients.iter().any(|p| {
            p.id_number == patient.id_number && (p.name != patient.name || p.gender != patient.gender)
        });
        if mismatch {
            return Err(rejected(
                400,
                "Name or gender does not match existing record for this ID number.",
            ));
        }
        let patient_id = state.next_patient_id.to_string();
        state.next_patient_id += 1;
        state.patients.push(PatientRecord {
            patient_id: patient_id.clone(),
            id_number: patient.id_number.clone(),
            name: patient.name.clone(),
            gender: patient.gender.clone(),
            phone: patient.phone.clone(),
            age: patient.age,
        });
        Ok(patient_id)
    }

    fn predict_stroke(&self, _symptoms: &SymptomVector) -> Result<f64, ApiError> {
        Ok(self.enter(Endpoint::PredictStroke)?.risk)
    }

    fn save_symptoms(&self, request: &SaveSymptomsRequest) -> Result<(), ApiError> {
        let mut state = self.enter(Endpoint::SaveSymptoms)?;
        if state.symptoms.contains_key(&request.patient_id) {
            return Err(conflict(ConflictCode::AlreadySaved, "Patient data already exists."));
        }
        state
            .symptoms
            .insert(request.patient_id.clone(), request.clone());
        Ok(())
    }

    fn predict_ct_scan(&self, _image: &ScanImage) -> Result<String, ApiError> {
        Ok(self.enter(Endpoint::PredictCtScan)?.label.clone())
    }

    fn save_ct_scan(&self, image: &ScanImage, form: &SaveScanForm) -> Result<(), ApiError> {
        let mut state = self.enter(Endpoint::SaveCtScan)?;
        if state.ct_scans.contains_key(&form.patient_id) {
            return Err(conflict(
                ConflictCode::AlreadySaved,
                "This patient's CT scan has already been saved.",
            ));
        }
        if state.misclassified.iter().any(|m| m.patient_id == form.patient_id) {
            return Err(conflict(
                ConflictCode::PendingCorrection,
                "This patient has a pending misclassification. Cannot save CT scan.",
            ));
        }
        state.ct_scans.insert(
            form.patient_id.clone(),
            StoredScan {
                file_name: format!("{}_{}", form.patient_id, image.file_name),
                classification: form.classification,
                doctor_username: form.doctor_username.clone(),
                model_training: form.model_training.to_string(),
            },
        );
        Ok(())
    }

    fn report_misclassification(
        &self,
        image: &ScanImage,
        form: &MisclassificationForm,
    ) -> Result<Option<u64>, ApiError> {
        let mut state = self.enter(Endpoint::ReportMisclassification)?;
        if state.misclassified.iter().any(|m| m.patient_id == form.patient_id) {
            return Err(conflict(
                ConflictCode::DuplicateCorrection,
                "Misclassification already reported for this patient.",
            ));
        }
        if state.ct_scans.contains_key(&form.patient_id) {
            return Err(conflict(
                ConflictCode::AlreadySaved,
                "CT scan already exists. Cannot report misclassification.",
            ));
        }
        let id = state.next_correction_id;
        state.next_correction_id += 1;
        state.misclassified.push(MisclassifiedScan {
            id,
            patient_id: form.patient_id.clone(),
            id_number: form.id_number.clone(),
            photo: format!("misclassified_images/{}", image.file_name),
            model_prediction: form.model_prediction.as_str().to_string(),
            correct_label: form.correct_label.as_str().to_string(),
            doctor_username: form.doctor_username.clone(),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        });
        Ok(Some(id))
    }

    fn check_readiness(&self, patient_id: &str) -> Result<bool, ApiError> {
        let state = self.enter(Endpoint::CheckReadiness)?;
        Ok(state.symptoms.contains_key(patient_id) && state.ct_scans.contains_key(patient_id))
    }

    fn has_symptom_record(&self, patient_id: &str) -> Result<bool, ApiError> {
        Ok(self.enter(Endpoint::PatientSymptoms)?.symptoms.contains_key(patient_id))
    }

    fn has_ct_record(&self, patient_id: &str) -> Result<bool, ApiError> {
        Ok(self.enter(Endpoint::PatientCtScans)?.ct_scans.contains_key(patient_id))
    }

    fn list_misclassified(&self) -> Result<Vec<MisclassifiedScan>, ApiError> {
        Ok(self.enter(Endpoint::ListMisclassified)?.misclassified.clone())
    }

    fn approve_misclassification(&self, request_id: u64, new_label: ScanLabel) -> Result<(), ApiError> {
        let mut state = self.enter(Endpoint::ApproveMisclassification)?;
        let index = state
            .misclassified
            .iter()
            .position(|m| m.id == request_id)
            .ok_or_else(|| rejected(404, "Scan not found"))?;
        let scan = state.misclassified.remove(index);
        let file_name = scan
            .photo
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string();
        state.ct_scans.insert(
            scan.patient_id.clone(),
            StoredScan {
                file_name: format!("{}_{}", scan.patient_id, file_name),
                classification: new_label,
                doctor_username: scan.doctor_username,
                model_training: NOT_USED_FOR_TRAINING.into(),
            },
        );
        Ok(())
    }

    fn retrain_stats(&self) -> Result<RetrainStats, ApiError> {
        let state = self.enter(Endpoint::RetrainStats)?;
        Ok(state
            .stats_override
            .clone()
            .unwrap_or_else(|| Self::derived_stats(&state)))
    }

    fn retrain(&self, _config: &RetrainConfig) -> Result<RetrainOutcome, ApiError> {
        let (delay, outcome) = {
            let state = self.enter(Endpoint::Retrain)?;
            let stats = state
                .stats_override
                .clone()
                .unwrap_or_else(|| Self::derived_stats(&state));
            if stats.total < crate::config::MIN_RETRAIN_SAMPLES {
                return Err(rejected(400, "Not enough labeled scans to retrain (min: 5)."));
            }
            (state.retrain_delay, state.retrain_outcome.clone())
        };
        // Sleep without holding the lock so other calls can observe progress.
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        // Scans used for this run no longer count as eligible.
        for scan in self.lock().ct_scans.values_mut() {
            if scan.model_training == NOT_USED_FOR_TRAINING {
                scan.model_training = USED_FOR_TRAINING.into();
            }
        }
        Ok(outcome)
    }

    fn clinical_insight(&self, patient_id: &str) -> Result<InsightResponse, ApiError> {
        let state = self.enter(Endpoint::ClinicalInsight)?;
        if let Some(insight) = &state.insight {
            return Ok(insight.clone());
        }
        let (Some(symptoms), Some(scan)) = (state.symptoms.get(patient_id), state.ct_scans.get(patient_id))
        else {
            return Ok(InsightResponse {
                error: Some("Patient data not found.".into()),
                ..InsightResponse::default()
            });
        };
        Ok(InsightResponse {
            summary: Some(format!(
                "- Age: {}\n- Symptom-based Stroke Risk: {}%\n- CT Classification: {}",
                symptoms.symptoms.age, symptoms.stroke_risk, scan.classification
            )),
            answer: Some("Consider urgent neurology review.".into()),
            source: None,
            error: None,
        })
    }

    fn ask(&self, _question: &str) -> Result<AskResponse, ApiError> {
        Ok(self.enter(Endpoint::Ask)?.answer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(patient_id: &str, label: ScanLabel) -> SaveScanForm {
        SaveScanForm {
            patient_id: patient_id.into(),
            id_number: "9001015009087".into(),
            classification: label,
            doctor_username: "dr.mokoena".into(),
            model_training: NOT_USED_FOR_TRAINING,
        }
    }

    #[test]
    fn counts_calls_per_endpoint() {
        let api = MockClinicalApi::new();
        api.check_readiness("1").unwrap();
        api.check_readiness("2").unwrap();
        assert_eq!(api.calls(Endpoint::CheckReadiness), 2);
        assert_eq!(api.calls(Endpoint::Retrain), 0);
        assert_eq!(api.total_calls(), 2);
    }

    #[test]
    fn injected_failure_is_counted_and_returned() {
        let api = MockClinicalApi::new();
        api.fail(Endpoint::RetrainStats, ApiError::Connection("mock".into()));
        assert!(api.retrain_stats().is_err());
        assert_eq!(api.calls(Endpoint::RetrainStats), 1);

        api.clear_failure(Endpoint::RetrainStats);
        assert!(api.retrain_stats().is_ok());
    }

    #[test]
    fn second_ct_save_conflicts() {
        let api = MockClinicalApi::new();
        let image = ScanImage::new("ct.png", vec![1, 2, 3]);
        api.save_ct_scan(&image, &form("42", ScanLabel::Ischemic)).unwrap();
        let err = api
            .save_ct_scan(&image, &form("42", ScanLabel::Normal))
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Conflict {
                code: ConflictCode::AlreadySaved,
                ..
            }
        ));
        assert_eq!(api.saved_scan("42").unwrap().classification, ScanLabel::Ischemic);
    }

    #[test]
    fn approve_moves_scan_into_store() {
        let api = MockClinicalApi::new();
        let image = ScanImage::new("ct.png", vec![1]);
        let id = api
            .report_misclassification(
                &image,
                &MisclassificationForm {
                    patient_id: "42".into(),
                    id_number: "9001015009087".into(),
                    model_prediction: ScanLabel::Ischemic,
                    correct_label: ScanLabel::Hemorrhagic,
                    doctor_username: "dr.mokoena".into(),
                },
            )
            .unwrap()
            .unwrap();

        api.approve_misclassification(id, ScanLabel::Hemorrhagic).unwrap();
        assert!(api.pending_corrections().is_empty());
        assert_eq!(api.saved_scan("42").unwrap().classification, ScanLabel::Hemorrhagic);
        assert_eq!(api.retrain_stats().unwrap().total, 1);
    }

    #[test]
    fn retrain_refused_below_minimum() {
        let api = MockClinicalApi::new().with_saved_scan("1", ScanLabel::Normal);
        let err = api.retrain(&RetrainConfig::default()).unwrap_err();
        assert!(matches!(err, ApiError::Rejected { status: 400, .. }));
    }

    #[test]
    fn successful_retrain_consumes_eligible_scans() {
        let api = (0..5).fold(MockClinicalApi::new(), |api, i| {
            api.with_saved_scan(&i.to_string(), ScanLabel::Normal)
        });
        api.retrain(&RetrainConfig::default()).unwrap();
        assert_eq!(api.retrain_stats().unwrap().total, 0);
        assert_eq!(api.saved_scan("0").unwrap().model_training, USED_FOR_TRAINING);
        assert!(api.retrain(&RetrainConfig::default()).is_err());
    }

    #[test]
    fn derived_insight_requires_both_records() {
        let api = MockClinicalApi::new().with_saved_symptoms("5");
        assert!(api.clinical_insight("5").unwrap().error.is_some());

        let api = api.with_saved_scan("5", ScanLabel::Normal);
        let insight = api.clinical_insight("5").unwrap();
        assert!(insight.error.is_none());
        assert!(insight.summary.unwrap().contains("CT Classification: Normal"));
    }
}
