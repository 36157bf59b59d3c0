use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;

use super::error::{classify_rejection, clean_detail, ApiError};
use super::types::*;
use super::ClinicalApi;
use crate::config::ClientConfig;
use crate::models::{
    MisclassifiedScan, NewPatient, PatientRecord, RetrainConfig, RetrainOutcome, RetrainStats,
    ScanImage, ScanLabel, SymptomVector,
};

/// Connect timeout, separate from the (long) request timeout.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP client for the clinical backend.
pub struct HttpClinicalApi {
    base_url: Url,
    client: Client,
    timeout_secs: u64,
}

impl HttpClinicalApi {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ApiError> {
        let normalized = format!("{}/", base_url.trim().trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| ApiError::Http(format!("invalid base URL {base_url}: {e}")))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ApiError::Http(e.to_string()))?;

        Ok(Self {
            base_url,
            client,
            timeout_secs,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(&config.base_url, config.timeout_secs)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Build an endpoint URL; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::Http(format!("base URL cannot be a base: {}", self.base_url)))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        request.send().map_err(|e| {
            if e.is_connect() {
                ApiError::Connection(self.base_url().to_string())
            } else if e.is_timeout() {
                ApiError::Timeout(self.timeout_secs)
            } else {
                ApiError::Http(e.to_string())
            }
        })
    }

    /// Pass successful responses through; classify everything else.
    fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.detail_text())
            .map(|d| clean_detail(&d))
            .filter(|d| !d.is_empty());

        tracing::debug!(status = status.as_u16(), detail = ?detail, "Backend rejected request");
        Err(classify_rejection(status.as_u16(), detail))
    }

    fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        response
            .json()
            .map_err(|e| ApiError::ResponseParsing(e.to_string()))
    }

    fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let response = self.send(self.client.get(url))?;
        Self::parse(Self::check(response)?)
    }

    fn post_json<B: serde::Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let response = self.send(self.client.post(url).json(body))?;
        Self::parse(Self::check(response)?)
    }

    fn post_form(&self, segments: &[&str], form: Form) -> Result<Response, ApiError> {
        let url = self.endpoint(segments)?;
        let response = self.send(self.client.post(url).multipart(form))?;
        Self::check(response)
    }

    fn image_part(image: &ScanImage) -> Result<Part, ApiError> {
        Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type())
            .map_err(|e| ApiError::Http(e.to_string()))
    }
}

impl ClinicalApi for HttpClinicalApi {
    fn list_patients(&self) -> Result<Vec<PatientRecord>, ApiError> {
        self.get_json(&["patients", "all"])
    }

    fn register_patient(&self, patient: &NewPatient) -> Result<String, ApiError> {
        let created: PatientCreated = self.post_json(&["api", "patient"], patient)?;
        Ok(created.patient_id)
    }

    fn predict_stroke(&self, symptoms: &SymptomVector) -> Result<f64, ApiError> {
        let prediction: StrokePrediction = self.post_json(&["predict-stroke"], symptoms)?;
        Ok(prediction.predicted_risk_percentage)
    }

    fn save_symptoms(&self, request: &SaveSymptomsRequest) -> Result<(), ApiError> {
        let _: serde_json::Value = self.post_json(&["save-symptoms"], request)?;
        Ok(())
    }

    fn predict_ct_scan(&self, image: &ScanImage) -> Result<String, ApiError> {
        let form = Form::new().part("file", Self::image_part(image)?);
        let prediction: CtPrediction = Self::parse(self.post_form(&["predict-ct-scan"], form)?)?;
        Ok(prediction.predicted_label)
    }

    fn save_ct_scan(&self, image: &ScanImage, form: &SaveScanForm) -> Result<(), ApiError> {
        let body = Form::new()
            .part("file", Self::image_part(image)?)
            .text("patient_id", form.patient_id.clone())
            .text("id_number", form.id_number.clone())
            .text("classification", form.classification.as_str())
            .text("doctor_username", form.doctor_username.clone())
            .text("model_training", form.model_training);
        self.post_form(&["save-ct-scan"], body)?;
        Ok(())
    }

    fn report_misclassification(
        &self,
        image: &ScanImage,
        form: &MisclassificationForm,
    ) -> Result<Option<u64>, ApiError> {
        let body = Form::new()
            .part("file", Self::image_part(image)?)
            .text("patient_id", form.patient_id.clone())
            .text("id_number", form.id_number.clone())
            .text("model_prediction", form.model_prediction.as_str())
            .text("correct_label", form.correct_label.as_str())
            .text("doctor_username", form.doctor_username.clone());
        let response = self.post_form(&["report-misclassification"], body)?;
        let receipt: MisclassificationReceipt = Self::parse(response)?;
        Ok(receipt.id)
    }

    fn check_readiness(&self, patient_id: &str) -> Result<bool, ApiError> {
        let readiness: Readiness = self.get_json(&["check-patient-readiness", patient_id])?;
        Ok(readiness.ready)
    }

    fn has_symptom_record(&self, patient_id: &str) -> Result<bool, ApiError> {
        match self.get_json::<serde_json::Value>(&["api", "patient_symptoms", patient_id]) {
            Ok(_) => Ok(true),
            Err(ApiError::Rejected { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn has_ct_record(&self, patient_id: &str) -> Result<bool, ApiError> {
        let body: serde_json::Value = self.get_json(&["api", "patient_ct_scans", patient_id])?;
        Ok(body.as_object().is_some_and(|fields| !fields.is_empty()))
    }

    fn list_misclassified(&self) -> Result<Vec<MisclassifiedScan>, ApiError> {
        self.get_json(&["misclassified-ct-scans"])
    }

    fn approve_misclassification(&self, request_id: u64, new_label: ScanLabel) -> Result<(), ApiError> {
        let body = Form::new()
            .text("misclassified_id", request_id.to_string())
            .text("new_label", new_label.as_str());
        self.post_form(&["approve-misclassification"], body)?;
        Ok(())
    }

    fn retrain_stats(&self) -> Result<RetrainStats, ApiError> {
        self.get_json(&["retrain-model", "stats"])
    }

    fn retrain(&self, config: &RetrainConfig) -> Result<RetrainOutcome, ApiError> {
        self.post_json(&["retrain-model"], config)
    }

    fn clinical_insight(&self, patient_id: &str) -> Result<InsightResponse, ApiError> {
        self.get_json(&["chatbot", "clinical-insight", patient_id])
    }

    fn ask(&self, question: &str) -> Result<AskResponse, ApiError> {
        self.post_json(&["chatbot", "ask"], &AskRequest { question })
    }
}
