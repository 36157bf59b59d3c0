use serde::{Deserialize, Serialize};

use super::enums::PredictionStatus;

/// Oldest age the stroke model accepts.
pub const MAX_AGE: u32 = 120;

/// Serializes `bool` as the 0/1 integers the stroke model was trained on.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(u8::deserialize(deserializer)? != 0)
    }
}

/// Presence of each symptom plus the patient's age, keyed by the
/// field names of the stroke-risk endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomVector {
    #[serde(with = "flag")]
    pub chest_pain: bool,
    #[serde(with = "flag")]
    pub shortness_of_breath: bool,
    #[serde(with = "flag")]
    pub irregular_heartbeat: bool,
    #[serde(rename = "Fatigue_Weakness", with = "flag")]
    pub fatigue_weakness: bool,
    #[serde(with = "flag")]
    pub dizziness: bool,
    #[serde(rename = "Swelling_Edema", with = "flag")]
    pub swelling_edema: bool,
    #[serde(rename = "Pain_in_Neck_Jaw_Shoulder_Back", with = "flag")]
    pub pain_neck_jaw_shoulder_back: bool,
    #[serde(rename = "Excessive_Sweating", with = "flag")]
    pub excessive_sweating: bool,
    #[serde(rename = "Persistent_Cough", with = "flag")]
    pub persistent_cough: bool,
    #[serde(rename = "Nausea_Vomiting", with = "flag")]
    pub nausea_vomiting: bool,
    #[serde(with = "flag")]
    pub high_blood_pressure: bool,
    #[serde(rename = "Chest_Discomfort_Activity", with = "flag")]
    pub chest_discomfort_activity: bool,
    #[serde(rename = "Cold_Hands_Feet", with = "flag")]
    pub cold_hands_feet: bool,
    #[serde(rename = "Snoring_Sleep_Apnea", with = "flag")]
    pub snoring_sleep_apnea: bool,
    #[serde(rename = "Anxiety_Feeling_of_Doom", with = "flag")]
    pub anxiety_feeling_of_doom: bool,
    #[serde(rename = "Age")]
    pub age: u32,
}

impl SymptomVector {
    /// All symptoms absent, age seeded from the patient record.
    pub fn for_age(age: u32) -> Self {
        Self {
            age,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.age > MAX_AGE {
            return Err(format!("Age must be between 0 and {MAX_AGE}."));
        }
        Ok(())
    }

    pub fn positive_count(&self) -> usize {
        [
            self.chest_pain,
            self.shortness_of_breath,
            self.irregular_heartbeat,
            self.fatigue_weakness,
            self.dizziness,
            self.swelling_edema,
            self.pain_neck_jaw_shoulder_back,
            self.excessive_sweating,
            self.persistent_cough,
            self.nausea_vomiting,
            self.high_blood_pressure,
            self.chest_discomfort_activity,
            self.cold_hands_feet,
            self.snoring_sleep_apnea,
            self.anxiety_feeling_of_doom,
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

/// Symptom vector with the risk computed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub symptoms: SymptomVector,
    /// Predicted stroke risk, 0–100.
    pub risk: Option<f64>,
    pub status: PredictionStatus,
}

impl PredictionRecord {
    pub fn new(symptoms: SymptomVector) -> Self {
        Self {
            symptoms,
            risk: None,
            status: PredictionStatus::Unset,
        }
    }

    /// Integer percentage persisted by the save endpoint.
    pub fn rounded_risk(&self) -> Option<u8> {
        self.risk.map(|r| r.round().clamp(0.0, 100.0) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_model_field_names() {
        let mut symptoms = SymptomVector::for_age(67);
        symptoms.chest_pain = true;
        symptoms.anxiety_feeling_of_doom = true;

        let json = serde_json::to_value(&symptoms).unwrap();
        assert_eq!(json["chest_pain"], 1);
        assert_eq!(json["Anxiety_Feeling_of_Doom"], 1);
        assert_eq!(json["Swelling_Edema"], 0);
        assert_eq!(json["Age"], 67);
        assert_eq!(json.as_object().unwrap().len(), 16);
    }

    #[test]
    fn deserializes_integer_flags() {
        let mut json = serde_json::to_value(SymptomVector::for_age(50)).unwrap();
        json["dizziness"] = serde_json::json!(1);
        let symptoms: SymptomVector = serde_json::from_value(json).unwrap();
        assert!(symptoms.dizziness);
        assert_eq!(symptoms.positive_count(), 1);
    }

    #[test]
    fn age_above_limit_is_rejected() {
        assert!(SymptomVector::for_age(120).validate().is_ok());
        assert!(SymptomVector::for_age(121).validate().is_err());
    }

    #[test]
    fn rounded_risk_rounds_half_up() {
        let mut record = PredictionRecord::new(SymptomVector::for_age(50));
        assert_eq!(record.rounded_risk(), None);
        record.risk = Some(72.5);
        assert_eq!(record.rounded_risk(), Some(73));
        record.risk = Some(12.49);
        assert_eq!(record.rounded_risk(), Some(12));
    }
}
