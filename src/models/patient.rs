use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Fallback recorded by the server when no doctor is attached.
pub const UNKNOWN_DOCTOR: &str = "unknown";

/// The active patient every workflow operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientContext {
    pub patient_id: String,
    pub id_number: String,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub phone: String,
    #[serde(default)]
    pub doctor_username: Option<String>,
}

impl PatientContext {
    pub fn doctor_or_unknown(&self) -> &str {
        self.doctor_username
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(UNKNOWN_DOCTOR)
    }

    pub fn has_doctor(&self) -> bool {
        self.doctor_username
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }

    /// Write-if-absent merge: fields already present in `existing` win,
    /// `incoming` only fills the gaps. Both must describe the same patient.
    pub fn merged_over(existing: &PatientContext, incoming: PatientContext) -> PatientContext {
        fn keep(old: &str, new: String) -> String {
            if old.trim().is_empty() {
                new
            } else {
                old.to_string()
            }
        }

        PatientContext {
            patient_id: existing.patient_id.clone(),
            id_number: keep(&existing.id_number, incoming.id_number),
            name: keep(&existing.name, incoming.name),
            age: if existing.age == 0 { incoming.age } else { existing.age },
            gender: keep(&existing.gender, incoming.gender),
            phone: keep(&existing.phone, incoming.phone),
            doctor_username: if existing.has_doctor() {
                existing.doctor_username.clone()
            } else {
                incoming.doctor_username
            },
        }
    }
}

/// One row of `GET /patients/all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub patient_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub id_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub phone: String,
    #[serde(default)]
    pub age: u32,
}

impl PatientRecord {
    /// Matches either the generated patient id or the national id number.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        !query.is_empty() && (self.patient_id == query || self.id_number == query)
    }

    pub fn into_context(self) -> PatientContext {
        PatientContext {
            patient_id: self.patient_id,
            id_number: self.id_number,
            name: self.name,
            age: self.age,
            gender: self.gender,
            phone: self.phone,
            doctor_username: None,
        }
    }
}

/// Intake form for a patient not yet registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    #[serde(rename = "idNumber")]
    pub id_number: String,
    pub name: String,
    pub phone: String,
    pub age: u32,
    pub gender: String,
}

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z\s]+$").expect("valid regex"));

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{7,15}$").expect("valid regex"));

impl NewPatient {
    /// Returns the first problem found, phrased for the intake form.
    pub fn validate(&self) -> Result<(), String> {
        if self.id_number.trim().is_empty()
            || self.name.trim().is_empty()
            || self.phone.trim().is_empty()
            || self.gender.trim().is_empty()
            || self.age == 0
        {
            return Err("Please fill out all fields.".into());
        }
        if !NAME_PATTERN.is_match(&self.name) {
            return Err("Name must contain only letters and spaces.".into());
        }
        if !PHONE_PATTERN.is_match(&self.phone) {
            return Err("Please enter a valid phone number (only digits, 7-15 characters).".into());
        }
        Ok(())
    }

    pub fn into_context(self, patient_id: String) -> PatientContext {
        PatientContext {
            patient_id,
            id_number: self.id_number,
            name: self.name,
            age: self.age,
            gender: self.gender,
            phone: self.phone,
            doctor_username: None,
        }
    }
}

/// The backend is inconsistent about ids: some rows carry numbers, some strings.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
        Raw::Null(()) => String::new(),
    })
}
