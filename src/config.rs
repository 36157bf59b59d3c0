use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "StrokeLink";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prediction/classification backend used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Retraining is slow (the server trains synchronously), so the default is generous.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Minimum number of eligible scans before retraining may be requested.
pub const MIN_RETRAIN_SAMPLES: u32 = 5;

const ENV_API_URL: &str = "STROKELINK_API_URL";
const ENV_TIMEOUT_SECS: &str = "STROKELINK_TIMEOUT_SECS";

/// Get the application data directory
/// ~/StrokeLink/ on all platforms. Falls back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Durable mirror of the active patient context.
pub fn context_file() -> PathBuf {
    app_data_dir().join("active_patient.json")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,strokelink=debug"
    } else {
        "info"
    }
}

/// Client-side settings for the backend connection and the retraining screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub min_retrain_samples: u32,
    /// Percentage points the cosmetic progress bar advances per tick.
    pub progress_step: u8,
    pub progress_tick_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            min_retrain_samples: MIN_RETRAIN_SAMPLES,
            progress_step: 10,
            progress_tick_ms: 400,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `STROKELINK_API_URL` / `STROKELINK_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(ENV_API_URL) {
            let url = url.trim();
            if !url.is_empty() {
                config.base_url = url.to_string();
            }
        }
        if let Ok(raw) = std::env::var(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout_secs = secs,
                _ => tracing::warn!(value = %raw, "Ignoring invalid {ENV_TIMEOUT_SECS}"),
            }
        }
        config
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms)
    }
}
