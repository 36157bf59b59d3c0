//! Wire shapes for the clinical backend's JSON and multipart bodies.

use serde::{Deserialize, Serialize};

use crate::models::{ScanLabel, SymptomVector};

/// Value the backend expects in `model_training` for scans not yet used
/// to train the CT model.
pub const NOT_USED_FOR_TRAINING: &str = "No";
pub const USED_FOR_TRAINING: &str = "Yes";

#[derive(Debug, Deserialize)]
pub struct StrokePrediction {
    pub predicted_risk_percentage: f64,
}

/// Body of `POST /save-symptoms`: the symptom vector flattened alongside
/// the patient keys and the rounded risk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveSymptomsRequest {
    #[serde(flatten)]
    pub symptoms: SymptomVector,
    pub patient_id: String,
    pub id_number: String,
    pub stroke_risk: u8,
    pub doctor_username: String,
}

#[derive(Debug, Deserialize)]
pub struct CtPrediction {
    pub predicted_label: String,
}

/// Form fields of `POST /save-ct-scan` (the image travels as `file`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveScanForm {
    pub patient_id: String,
    pub id_number: String,
    pub classification: ScanLabel,
    pub doctor_username: String,
    pub model_training: &'static str,
}

/// Form fields of `POST /report-misclassification`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MisclassificationForm {
    pub patient_id: String,
    pub id_number: String,
    pub model_prediction: ScanLabel,
    pub correct_label: ScanLabel,
    pub doctor_username: String,
}

#[derive(Debug, Deserialize)]
pub struct MisclassificationReceipt {
    #[serde(default)]
    pub id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PatientCreated {
    #[serde(rename = "patientID", deserialize_with = "crate::models::patient::string_or_number")]
    pub patient_id: String,
}

#[derive(Debug, Deserialize)]
pub struct Readiness {
    pub ready: bool,
}

/// Answer from `GET /chatbot/clinical-insight/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightResponse {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub source: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskRequest<'a> {
    pub question: &'a str,
}

/// Answer from `POST /chatbot/ask`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub source: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `{detail}` error body used by every endpoint.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// FastAPI validation errors carry a list instead of a string.
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_symptoms_flattens_vector() {
        let mut symptoms = SymptomVector::for_age(58);
        symptoms.dizziness = true;
        let body = SaveSymptomsRequest {
            symptoms,
            patient_id: "42".into(),
            id_number: "9001015009087".into(),
            stroke_risk: 73,
            doctor_username: "dr.mokoena".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["dizziness"], 1);
        assert_eq!(json["Age"], 58);
        assert_eq!(json["stroke_risk"], 73);
        assert_eq!(json["patient_id"], "42");
    }

    #[test]
    fn insight_with_error_only() {
        let parsed: InsightResponse =
            serde_json::from_str(r#"{"error": "Patient data not found."}"#).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("Patient data not found."));
        assert!(parsed.summary.is_none());
    }

    #[test]
    fn patient_created_accepts_numeric_id() {
        let parsed: PatientCreated =
            serde_json::from_str(r#"{"message": "Patient saved", "patientID": 1042}"#).unwrap();
        assert_eq!(parsed.patient_id, "1042");
    }

    #[test]
    fn error_body_string_and_list_details() {
        let body: ErrorBody = serde_json::from_str(r#"{"detail": "Scan not found"}"#).unwrap();
        assert_eq!(body.detail_text().as_deref(), Some("Scan not found"));

        let body: ErrorBody =
            serde_json::from_str(r#"{"detail": [{"loc": ["body", "age"]}]}"#).unwrap();
        assert!(body.detail_text().unwrap().contains("age"));
    }
}
