//! Progress reporting, cooperative cancellation and the error type shared
//! by the search loops.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("generation {generation} produced no successful evaluations")]
    NoSuccessfulEvaluations { generation: usize },

    #[error("no trial completed successfully")]
    NoCompletedTrials,
}

/// Snapshot sent after every completed generation or trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchProgress {
    pub completed: usize,
    pub total: usize,
    /// Best raw score seen so far, if any evaluation succeeded.
    pub best_score: Option<f64>,
}

/// Callback and cancel flag threaded through a search run.
#[derive(Clone, Copy, Default)]
pub struct SearchControl<'a> {
    pub progress: Option<&'a dyn Fn(&SearchProgress)>,
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> SearchControl<'a> {
    pub fn new(
        progress: Option<&'a dyn Fn(&SearchProgress)>,
        cancel: Option<&'a AtomicBool>,
    ) -> Self {
        Self { progress, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|f| f.load(Ordering::Relaxed))
    }

    pub fn report(&self, completed: usize, total: usize, best_score: Option<f64>) {
        if let Some(cb) = self.progress {
            cb(&SearchProgress {
                completed,
                total,
                best_score,
            });
        }
    }
}

impl std::fmt::Debug for SearchControl<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchControl")
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
