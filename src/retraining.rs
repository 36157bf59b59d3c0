//! CT model retraining trigger.
//!
//! Retraining is refused locally below the eligible-sample threshold, so the
//! backend never sees a request it would reject. Stats are eventually
//! consistent: the trigger works from the snapshot taken by its last
//! [`RetrainingTrigger::refresh_stats`] (the screen refreshes on entry) and
//! only fetches on its own when no snapshot exists yet.
//!
//! While the request runs, a [`ProgressIndicator`] advances on a timer. It is
//! cosmetic: it knows nothing about the server, and it is stopped and set to
//! 100 the moment the request settles.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use crate::api::ClinicalApi;
use crate::config::ClientConfig;
use crate::error::WorkflowError;
use crate::inflight::{OperationGate, OperationKind};
use crate::models::{RetrainConfig, RetrainOutcome, RetrainStats};

/// Key for the retrain guard; there is one model per backend.
const MODEL_RECORD: &str = "model";

// ═══════════════════════════════════════════════════════════
// ProgressIndicator
// ═══════════════════════════════════════════════════════════

/// Timer-driven progress percentage, shared with whoever renders it.
pub struct ProgressIndicator {
    value: Arc<AtomicU8>,
    step: u8,
    tick: Duration,
}

impl ProgressIndicator {
    pub fn new(step: u8, tick: Duration) -> Self {
        Self {
            value: Arc::new(AtomicU8::new(0)),
            step: step.max(1),
            tick,
        }
    }

    pub fn value(&self) -> u8 {
        self.value.load(Ordering::Relaxed)
    }

    /// Shared handle for a renderer on another thread.
    pub fn handle(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.value)
    }

    /// Run `call` on this thread while a timer thread advances the value.
    ///
    /// The timer is joined before this returns, and the value is 100
    /// afterwards whether `call` succeeded or not.
    pub fn run_alongside<T>(&self, call: impl FnOnce() -> T) -> T {
        self.value.store(0, Ordering::Relaxed);
        let (settled_tx, settled_rx) = mpsc::channel::<()>();

        let result = std::thread::scope(|s| {
            let value = &self.value;
            let (step, tick) = (self.step, self.tick);
            s.spawn(move || loop {
                match settled_rx.recv_timeout(tick) {
                    Err(RecvTimeoutError::Timeout) => {
                        let _ = value.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                            Some(v.saturating_add(step).min(100))
                        });
                    }
                    // Sender dropped: the call has settled.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

            let result = call();
            drop(settled_tx);
            result
        });

        self.value.store(100, Ordering::Relaxed);
        result
    }
}

// ═══════════════════════════════════════════════════════════
// RetrainingTrigger
// ═══════════════════════════════════════════════════════════

pub struct RetrainingTrigger<'a> {
    api: &'a dyn ClinicalApi,
    operations: &'a OperationGate,
    min_samples: u32,
    progress: ProgressIndicator,
    stats: Option<RetrainStats>,
    last_outcome: Option<RetrainOutcome>,
}

impl<'a> RetrainingTrigger<'a> {
    pub fn new(api: &'a dyn ClinicalApi, operations: &'a OperationGate, config: &ClientConfig) -> Self {
        Self {
            api,
            operations,
            min_samples: config.min_retrain_samples,
            progress: ProgressIndicator::new(config.progress_step, config.progress_tick()),
            stats: None,
            last_outcome: None,
        }
    }

    pub fn progress(&self) -> &ProgressIndicator {
        &self.progress
    }

    pub fn min_samples(&self) -> u32 {
        self.min_samples
    }

    /// The current snapshot, fetching one if none has been loaded.
    pub fn get_stats(&mut self) -> Result<&RetrainStats, WorkflowError> {
        if self.stats.is_none() {
            self.refresh_stats()?;
        }
        self.stats
            .as_ref()
            .ok_or_else(|| WorkflowError::Network("retrain stats unavailable".into()))
    }

    /// Replace the snapshot with a fresh read. On failure the old snapshot is kept.
    pub fn refresh_stats(&mut self) -> Result<&RetrainStats, WorkflowError> {
        let stats = self.api.retrain_stats()?;
        tracing::debug!(
            total = stats.total,
            normal = stats.by_class.normal,
            ischemic = stats.by_class.ischemic,
            hemorrhagic = stats.by_class.hemorrhagic,
            "Retrain stats refreshed"
        );
        Ok(&*self.stats.insert(stats))
    }

    /// Whether the current snapshot allows retraining. `false` without one.
    pub fn can_retrain(&self) -> bool {
        self.stats
            .as_ref()
            .is_some_and(|s| s.meets_threshold(self.min_samples))
    }

    pub fn last_outcome(&self) -> Option<&RetrainOutcome> {
        self.last_outcome.as_ref()
    }

    /// Retrain the CT model on the eligible corrected scans.
    pub fn retrain(&mut self, config: &RetrainConfig) -> Result<RetrainOutcome, WorkflowError> {
        config.validate().map_err(WorkflowError::Validation)?;

        let total = self.get_stats()?.total;
        if total < self.min_samples {
            tracing::info!(total, required = self.min_samples, "Retrain refused below threshold");
            return Err(WorkflowError::InsufficientSamples {
                total,
                required: self.min_samples,
            });
        }

        let operations = self.operations;
        let _guard = operations.claim(OperationKind::Retrain, MODEL_RECORD)?;

        tracing::info!(
            total,
            epochs = config.epochs,
            learning_rate = config.learning_rate,
            "Retraining started"
        );
        let api = self.api;
        let outcome = self.progress.run_alongside(|| api.retrain(config));

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "Retraining failed");
                return Err(e.into());
            }
        };

        tracing::info!(accuracy = ?outcome.external_accuracy, "Retraining completed");
        // The run consumed the eligible scans; the old snapshot no longer holds.
        self.stats = None;
        if let Err(e) = self.refresh_stats() {
            tracing::warn!(error = %e, "Could not refresh stats after retraining");
        }
        self.last_outcome = Some(outcome.clone());
        Ok(outcome)
    }
}
