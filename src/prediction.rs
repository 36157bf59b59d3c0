//! Symptom-based stroke risk: predict, then save once per patient.
//!
//! Idle → Predicted → Saved. Saved is terminal. Errors are reported through
//! the returned `Result` and mirrored in [`PredictionWorkflow::last_error`]
//! for display; they never change the record's status.

use crate::api::{ClinicalApi, ConflictCode, SaveSymptomsRequest};
use crate::error::WorkflowError;
use crate::inflight::{OperationGate, OperationKind};
use crate::models::{PatientContext, PredictionRecord, PredictionStatus, SymptomVector};

pub struct PredictionWorkflow<'a> {
    api: &'a dyn ClinicalApi,
    operations: &'a OperationGate,
    patient: &'a PatientContext,
    record: PredictionRecord,
    last_error: Option<String>,
}

impl<'a> PredictionWorkflow<'a> {
    pub fn new(api: &'a dyn ClinicalApi, operations: &'a OperationGate, patient: &'a PatientContext) -> Self {
        Self {
            api,
            operations,
            patient,
            record: PredictionRecord::new(SymptomVector::for_age(patient.age)),
            last_error: None,
        }
    }

    pub fn patient(&self) -> &PatientContext {
        self.patient
    }

    pub fn record(&self) -> &PredictionRecord {
        &self.record
    }

    pub fn status(&self) -> PredictionStatus {
        self.record.status
    }

    /// Display text for the most recent failure, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Empty symptom form with the age taken from the patient record.
    pub fn default_symptoms(&self) -> SymptomVector {
        SymptomVector::for_age(self.patient.age)
    }

    /// Compute the stroke risk (0–100) for `symptoms`.
    pub fn predict(&mut self, symptoms: SymptomVector) -> Result<f64, WorkflowError> {
        let result = self.try_predict(symptoms);
        self.track(&result);
        result
    }

    /// Persist the predicted risk. Requires a prediction; succeeds at most once.
    pub fn save(&mut self) -> Result<(), WorkflowError> {
        let result = self.try_save();
        self.track(&result);
        result
    }

    fn try_predict(&mut self, symptoms: SymptomVector) -> Result<f64, WorkflowError> {
        if self.record.status == PredictionStatus::Saved {
            return Err(WorkflowError::Validation(
                "The stroke record for this patient has already been saved.".into(),
            ));
        }
        symptoms.validate().map_err(WorkflowError::Validation)?;

        let risk = self.api.predict_stroke(&symptoms)?;
        if !(risk.is_finite() && (0.0..=100.0).contains(&risk)) {
            tracing::warn!(patient_id = %self.patient.patient_id, risk, "Risk outside 0-100");
            return Err(WorkflowError::Network(format!("unexpected risk value {risk}")));
        }

        tracing::info!(
            patient_id = %self.patient.patient_id,
            risk,
            positive = symptoms.positive_count(),
            "Stroke risk predicted"
        );
        self.record = PredictionRecord {
            symptoms,
            risk: Some(risk),
            status: PredictionStatus::Predicted,
        };
        Ok(risk)
    }

    fn try_save(&mut self) -> Result<(), WorkflowError> {
        match self.record.status {
            PredictionStatus::Unset => {
                return Err(WorkflowError::Validation(
                    "Please generate the stroke risk prediction before saving.".into(),
                ))
            }
            PredictionStatus::Saved => {
                return Err(WorkflowError::Conflict {
                    code: ConflictCode::AlreadySaved,
                    detail: "Patient data already exists.".into(),
                })
            }
            PredictionStatus::Predicted => {}
        }
        let stroke_risk = self.record.rounded_risk().ok_or_else(|| {
            WorkflowError::Validation("Please generate the stroke risk prediction before saving.".into())
        })?;

        let operations = self.operations;
        let _guard = operations.claim(OperationKind::SaveStrokeRecord, &self.patient.patient_id)?;

        let request = SaveSymptomsRequest {
            symptoms: self.record.symptoms.clone(),
            patient_id: self.patient.patient_id.clone(),
            id_number: self.patient.id_number.clone(),
            stroke_risk,
            doctor_username: self.patient.doctor_or_unknown().to_string(),
        };
        self.api.save_symptoms(&request)?;

        tracing::info!(patient_id = %self.patient.patient_id, stroke_risk, "Stroke record saved");
        self.record.status = PredictionStatus::Saved;
        Ok(())
    }

    fn track<T>(&mut self, result: &Result<T, WorkflowError>) {
        self.last_error = match result {
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(patient_id = %self.patient.patient_id, error = %e, "Prediction step failed");
                Some(e.user_message())
            }
        };
    }
}
