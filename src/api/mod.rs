//! REST transport to the clinical backend.
//!
//! Every endpoint the workflows consume sits behind [`ClinicalApi`], so the
//! workflows never see HTTP. [`HttpClinicalApi`] is the production client;
//! [`MockClinicalApi`] applies the same server-side rules in memory.

pub mod error;
pub mod http;
pub mod mock;
pub mod types;

pub use error::{classify_rejection, ApiError, ConflictCode};
pub use http::HttpClinicalApi;
pub use mock::{Endpoint, MockClinicalApi};
pub use types::{AskResponse, InsightResponse, MisclassificationForm, SaveScanForm, SaveSymptomsRequest};

use crate::models::{
    MisclassifiedScan, NewPatient, PatientRecord, RetrainConfig, RetrainOutcome, RetrainStats,
    ScanImage, ScanLabel, SymptomVector,
};

/// Blocking client for the prediction, classification and assistant services.
///
/// Calls are independent request/response pairs: no batching, no retries,
/// no cancellation once issued.
pub trait ClinicalApi: Send + Sync {
    /// `GET /patients/all`
    fn list_patients(&self) -> Result<Vec<PatientRecord>, ApiError>;

    /// `POST /api/patient` → generated patient id.
    fn register_patient(&self, patient: &NewPatient) -> Result<String, ApiError>;

    /// `POST /predict-stroke` → risk percentage.
    fn predict_stroke(&self, symptoms: &SymptomVector) -> Result<f64, ApiError>;

    /// `POST /save-symptoms`
    fn save_symptoms(&self, request: &SaveSymptomsRequest) -> Result<(), ApiError>;

    /// `POST /predict-ct-scan` → raw label as returned by the classifier.
    fn predict_ct_scan(&self, image: &ScanImage) -> Result<String, ApiError>;

    /// `POST /save-ct-scan`
    fn save_ct_scan(&self, image: &ScanImage, form: &SaveScanForm) -> Result<(), ApiError>;

    /// `POST /report-misclassification` → correction id, if echoed.
    fn report_misclassification(
        &self,
        image: &ScanImage,
        form: &MisclassificationForm,
    ) -> Result<Option<u64>, ApiError>;

    /// `GET /check-patient-readiness/{id}`
    fn check_readiness(&self, patient_id: &str) -> Result<bool, ApiError>;

    /// `GET /api/patient_symptoms/{id}`: whether a stroke record is saved.
    fn has_symptom_record(&self, patient_id: &str) -> Result<bool, ApiError>;

    /// `GET /api/patient_ct_scans/{id}`: whether a CT record is saved.
    fn has_ct_record(&self, patient_id: &str) -> Result<bool, ApiError>;

    /// `GET /misclassified-ct-scans`
    fn list_misclassified(&self) -> Result<Vec<MisclassifiedScan>, ApiError>;

    /// `POST /approve-misclassification`
    fn approve_misclassification(&self, request_id: u64, new_label: ScanLabel) -> Result<(), ApiError>;

    /// `GET /retrain-model/stats`
    fn retrain_stats(&self) -> Result<RetrainStats, ApiError>;

    /// `POST /retrain-model`
    fn retrain(&self, config: &RetrainConfig) -> Result<RetrainOutcome, ApiError>;

    /// `GET /chatbot/clinical-insight/{id}`
    fn clinical_insight(&self, patient_id: &str) -> Result<InsightResponse, ApiError>;

    /// `POST /chatbot/ask`
    fn ask(&self, question: &str) -> Result<AskResponse, ApiError>;
}
