use serde::{Deserialize, Serialize};

use super::enums::{CorrectionStatus, ScanLabel};
use super::patient::string_or_number;
use super::ModelError;

/// A disputed CT classification awaiting (or past) supervisor approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRequest {
    /// Server-assigned id. `None` only if the server did not echo one back.
    pub request_id: Option<u64>,
    pub patient_id: String,
    pub id_number: String,
    pub scan_ref: String,
    pub model_prediction: ScanLabel,
    pub correct_label: ScanLabel,
    pub doctor_username: String,
    pub submitted_at: Option<String>,
    pub status: CorrectionStatus,
}

/// One row of `GET /misclassified-ct-scans`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisclassifiedScan {
    pub id: u64,
    #[serde(deserialize_with = "string_or_number")]
    pub patient_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub id_number: String,
    #[serde(default)]
    pub photo: String,
    pub model_prediction: String,
    pub correct_label: String,
    #[serde(default)]
    pub doctor_username: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl TryFrom<MisclassifiedScan> for CorrectionRequest {
    type Error = ModelError;

    fn try_from(row: MisclassifiedScan) -> Result<Self, Self::Error> {
        let scan_ref = row
            .photo
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            request_id: Some(row.id),
            model_prediction: ScanLabel::parse_loose(&row.model_prediction)?,
            correct_label: ScanLabel::parse_loose(&row.correct_label)?,
            patient_id: row.patient_id,
            id_number: row.id_number,
            scan_ref,
            doctor_username: row.doctor_username,
            submitted_at: row.timestamp,
            status: CorrectionStatus::Pending,
        })
    }
}
