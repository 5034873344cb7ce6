//! Trial pruning on the provisional (allocation-agnostic) score.

use super::optimizer::TrialRecord;

pub trait Pruner: Send + Sync {
    /// Whether a trial whose provisional score is `provisional` should stop
    /// before its second stage.
    fn should_prune(&self, provisional: f64, history: &[TrialRecord]) -> bool;
}

/// Prunes a trial whose provisional score is below the median of earlier
/// trials' provisional scores, once `n_startup_trials` of them exist.
#[derive(Debug, Clone, Copy)]
pub struct MedianPruner {
    pub n_startup_trials: usize,
}

impl Default for MedianPruner {
    fn default() -> Self {
        Self { n_startup_trials: 5 }
    }
}

impl Pruner for MedianPruner {
    fn should_prune(&self, provisional: f64, history: &[TrialRecord]) -> bool {
        let mut seen: Vec<f64> = history
            .iter()
            .filter_map(|t| t.provisional)
            .filter(|v| v.is_finite())
            .collect();
        if seen.len() < self.n_startup_trials.max(1) {
            return false;
        }
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = seen.len() / 2;
        let median = if seen.len() % 2 == 0 {
            (seen[mid - 1] + seen[mid]) / 2.0
        } else {
            seen[mid]
        };
        provisional < median
    }
}
