use serde::{Deserialize, Serialize};

use super::enums::ScanLabel;

/// Eligible-sample counts per label, as reported by `/retrain-model/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    #[serde(rename = "Normal", default)]
    pub normal: u32,
    #[serde(rename = "Ischemic", default)]
    pub ischemic: u32,
    #[serde(rename = "Hemorrhagic", default)]
    pub hemorrhagic: u32,
}

impl ClassCounts {
    pub fn get(&self, label: ScanLabel) -> u32 {
        match label {
            ScanLabel::Normal => self.normal,
            ScanLabel::Ischemic => self.ischemic,
            ScanLabel::Hemorrhagic => self.hemorrhagic,
        }
    }

    pub fn increment(&mut self, label: ScanLabel) {
        match label {
            ScanLabel::Normal => self.normal += 1,
            ScanLabel::Ischemic => self.ischemic += 1,
            ScanLabel::Hemorrhagic => self.hemorrhagic += 1,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScanLabel, u32)> + '_ {
        ScanLabel::ALL.into_iter().map(|label| (label, self.get(label)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrainStats {
    pub total: u32,
    #[serde(default)]
    pub by_class: ClassCounts,
}

impl RetrainStats {
    pub fn meets_threshold(&self, required: u32) -> bool {
        self.total >= required
    }
}

/// Hyperparameters sent with a retrain request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrainConfig {
    pub epochs: u32,
    pub learning_rate: f64,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            epochs: 5,
            learning_rate: 0.001,
        }
    }
}

impl RetrainConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.epochs == 0 {
            return Err("Epochs must be at least 1.".into());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err("Learning rate must be a positive number.".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainOutcome {
    #[serde(default)]
    pub message: Option<String>,
    /// Held-out accuracy in [0, 1], when the server evaluated one.
    #[serde(default)]
    pub external_accuracy: Option<f64>,
}

impl RetrainOutcome {
    /// Accuracy as a percentage with two decimals, e.g. `"93.45%"`.
    pub fn accuracy_percent(&self) -> Option<String> {
        self.external_accuracy
            .filter(|a| a.is_finite())
            .map(|a| format!("{:.2}%", a.clamp(0.0, 1.0) * 100.0))
    }

    pub fn summary(&self) -> String {
        let message = self
            .message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or("Retraining completed.");
        match self.accuracy_percent() {
            Some(accuracy) => format!("{message}\nTest Accuracy: {accuracy}"),
            None => message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_parse_server_shape() {
        let stats: RetrainStats = serde_json::from_str(
            r#"{"total": 7, "by_class": {"Normal": 2, "Hemorrhagic": 1, "Ischemic": 4}}"#,
        )
        .unwrap();
        assert_eq!(stats.total, 7);
        assert_eq!(stats.by_class.get(ScanLabel::Ischemic), 4);
        assert!(stats.meets_threshold(5));
    }

    #[test]
    fn stats_without_breakdown_default_to_zero() {
        let stats: RetrainStats = serde_json::from_str(r#"{"total": 3}"#).unwrap();
        assert_eq!(stats.by_class, ClassCounts::default());
        assert!(!stats.meets_threshold(5));
    }

    #[test]
    fn accuracy_formats_two_decimals() {
        let outcome = RetrainOutcome {
            message: Some("Model retrained".into()),
            external_accuracy: Some(0.9346),
        };
        assert_eq!(outcome.accuracy_percent().as_deref(), Some("93.46%"));
        assert_eq!(outcome.summary(), "Model retrained\nTest Accuracy: 93.46%");
    }

    #[test]
    fn summary_without_accuracy_uses_default_message() {
        let outcome = RetrainOutcome {
            message: None,
            external_accuracy: None,
        };
        assert_eq!(outcome.summary(), "Retraining completed.");
    }

    #[test]
    fn config_validation() {
        assert!(RetrainConfig::default().validate().is_ok());
        assert!(RetrainConfig { epochs: 0, learning_rate: 0.001 }.validate().is_err());
        assert!(RetrainConfig { epochs: 3, learning_rate: 0.0 }.validate().is_err());
        assert!(RetrainConfig { epochs: 3, learning_rate: f64::NAN }.validate().is_err());
    }
}
