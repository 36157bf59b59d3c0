pub mod api; // REST transport to the prediction/classification backend
pub mod config;
pub mod core_state; // Explicit session context shared by every workflow
pub mod error;
pub mod identity; // Active patient context + durable mirror
pub mod inflight; // Exclusive guard for mutating calls
pub mod insight; // Assistant transcript
pub mod ledger; // Pending misclassification approvals
pub mod models;
pub mod prediction; // Symptom-based stroke risk
pub mod readiness; // Assistant access gate
pub mod retraining; // CT model retraining trigger
pub mod scan; // CT classification, save and dispute

pub use core_state::CoreState;
pub use error::{ErrorKind, WorkflowError};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to [`config::default_log_filter`].
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} client starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
