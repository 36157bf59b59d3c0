//! CT scan classification: classify, then either save or dispute.
//!
//! Idle → Predicted → {Saved | Disputed}. Selecting a new image starts over.

use crate::api::{ClinicalApi, ConflictCode, MisclassificationForm, SaveScanForm};
use crate::api::types::NOT_USED_FOR_TRAINING;
use crate::error::WorkflowError;
use crate::inflight::{OperationGate, OperationKind};
use crate::models::{
    CorrectionRequest, CorrectionStatus, PatientContext, ScanClassificationRecord, ScanImage, ScanLabel,
    ScanStatus,
};

pub struct ScanClassificationWorkflow<'a> {
    api: &'a dyn ClinicalApi,
    operations: &'a OperationGate,
    patient: &'a PatientContext,
    record: Option<ScanClassificationRecord>,
}

impl<'a> ScanClassificationWorkflow<'a> {
    pub fn new(api: &'a dyn ClinicalApi, operations: &'a OperationGate, patient: &'a PatientContext) -> Self {
        Self {
            api,
            operations,
            patient,
            record: None,
        }
    }

    pub fn record(&self) -> Option<&ScanClassificationRecord> {
        self.record.as_ref()
    }

    pub fn status(&self) -> ScanStatus {
        self.record.as_ref().map_or(ScanStatus::Unset, |r| r.status)
    }

    pub fn label(&self) -> Option<ScanLabel> {
        self.record.as_ref().and_then(|r| r.label)
    }

    /// Start over with `image`, discarding any earlier prediction.
    pub fn select_image(&mut self, image: ScanImage) {
        tracing::debug!(patient_id = %self.patient.patient_id, file = %image.file_name, "Scan selected");
        self.record = Some(ScanClassificationRecord::new(image));
    }

    /// Select `image` and classify it.
    pub fn classify(&mut self, image: ScanImage) -> Result<ScanLabel, WorkflowError> {
        if image.bytes.is_empty() {
            return Err(WorkflowError::Validation("Please select a CT scan image first.".into()));
        }
        self.select_image(image);
        let Some(record) = self.record.as_mut() else {
            return Err(WorkflowError::Validation("Please select a CT scan image first.".into()));
        };

        let raw = self.api.predict_ct_scan(&record.image)?;
        let label = ScanLabel::parse_loose(&raw).map_err(|_| {
            tracing::warn!(label = %raw, "Classifier returned an unknown label");
            WorkflowError::Network(format!("unexpected label {raw:?}"))
        })?;

        tracing::info!(patient_id = %self.patient.patient_id, %label, "CT scan classified");
        record.label = Some(label);
        record.status = ScanStatus::Predicted;
        Ok(label)
    }

    /// Persist the predicted label, flagged as not yet used for training.
    pub fn save(&mut self) -> Result<(), WorkflowError> {
        let (record, label) = predicted_record(&mut self.record, "saving")?;

        let operations = self.operations;
        let _guard = operations.claim(OperationKind::SaveScan, &self.patient.patient_id)?;

        let form = SaveScanForm {
            patient_id: self.patient.patient_id.clone(),
            id_number: self.patient.id_number.clone(),
            classification: label,
            doctor_username: self.patient.doctor_or_unknown().to_string(),
            model_training: NOT_USED_FOR_TRAINING,
        };
        if let Err(e) = self.api.save_ct_scan(&record.image, &form) {
            tracing::warn!(patient_id = %self.patient.patient_id, error = %e, "CT scan save failed");
            return Err(e.into());
        }

        tracing::info!(patient_id = %self.patient.patient_id, %label, "CT scan saved");
        record.status = ScanStatus::Saved;
        Ok(())
    }

    /// Report the prediction as wrong and propose `correct_label`.
    pub fn dispute(&mut self, correct_label: &str) -> Result<CorrectionRequest, WorkflowError> {
        if correct_label.trim().is_empty() {
            return Err(WorkflowError::Validation("Please select the correct label.".into()));
        }
        let correct = ScanLabel::parse_loose(correct_label).map_err(|_| {
            WorkflowError::Validation(format!(
                "\"{}\" is not a valid label. Choose Normal, Ischemic or Hemorrhagic.",
                correct_label.trim()
            ))
        })?;
        let (record, predicted) = predicted_record(&mut self.record, "reporting a misclassification")?;
        if predicted == correct {
            return Err(WorkflowError::Validation(format!(
                "The model already predicted {correct}. Choose a different label."
            )));
        }

        let operations = self.operations;
        let _guard = operations.claim(OperationKind::DisputeScan, &self.patient.patient_id)?;

        let form = MisclassificationForm {
            patient_id: self.patient.patient_id.clone(),
            id_number: self.patient.id_number.clone(),
            model_prediction: predicted,
            correct_label: correct,
            doctor_username: self.patient.doctor_or_unknown().to_string(),
        };
        let request_id = match self.api.report_misclassification(&record.image, &form) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(patient_id = %self.patient.patient_id, error = %e, "Misclassification report failed");
                return Err(e.into());
            }
        };

        tracing::info!(
            patient_id = %self.patient.patient_id,
            request_id = ?request_id,
            %predicted,
            %correct,
            "Misclassification reported"
        );
        record.status = ScanStatus::Disputed;
        Ok(CorrectionRequest {
            request_id,
            patient_id: form.patient_id,
            id_number: form.id_number,
            scan_ref: record.image.scan_ref().to_string(),
            model_prediction: predicted,
            correct_label: correct,
            doctor_username: form.doctor_username,
            submitted_at: Some(chrono::Utc::now().to_rfc3339()),
            status: CorrectionStatus::Pending,
        })
    }
}

/// The record, if it is in `Predicted` and can still be saved or disputed.
fn predicted_record<'r>(
    record: &'r mut Option<ScanClassificationRecord>,
    action: &str,
) -> Result<(&'r mut ScanClassificationRecord, ScanLabel), WorkflowError> {
    let record = record
        .as_mut()
        .ok_or_else(|| WorkflowError::Validation(format!("Please classify a CT scan before {action}.")))?;
    match (record.status, record.label) {
        (ScanStatus::Predicted, Some(label)) => Ok((record, label)),
        (ScanStatus::Saved, _) => Err(WorkflowError::Conflict {
            code: ConflictCode::AlreadySaved,
            detail: "This patient's CT scan has already been saved.".into(),
        }),
        (ScanStatus::Disputed, _) => Err(WorkflowError::Conflict {
            code: ConflictCode::DuplicateCorrection,
            detail: "Misclassification already reported for this scan.".into(),
        }),
        _ => Err(WorkflowError::Validation(format!(
            "Please classify a CT scan before {action}."
        ))),
    }
}
