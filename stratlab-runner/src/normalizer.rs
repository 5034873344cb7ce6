//! Score normalizer — batch-relative composite scores.
//!
//! Raw composite scores mix metrics with very different scales (a Sharpe of
//! 1.5 next to a total return of 0.3). For ranking a batch, each weighted
//! metric is min-max scaled across the batch's successful results first,
//! then folded with the same weights. The result is invariant to any
//! positive rescaling or shift of an individual metric.

use std::cmp::Ordering;

use crate::config::ConfigError;
use crate::evaluator::EvaluationResult;
use crate::scoring::{ScoreComponent, ScoringWeights};

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreNormalizer {
    weights: ScoringWeights,
}

impl ScoreNormalizer {
    /// Fails on negative, non-finite or all-zero weights.
    pub fn new(weights: ScoringWeights) -> Result<Self, ConfigError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// Set `normalized_score` on every successful result. Failed results
    /// keep `None`. A metric constant across the batch scales to 0.5.
    pub fn normalize(&self, results: &mut [EvaluationResult]) {
        let bounds: Vec<(f64, f64)> = ScoreComponent::ALL
            .iter()
            .map(|c| {
                results
                    .iter()
                    .filter(|r| r.success)
                    .map(|r| c.extract(&r.metrics))
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                        (lo.min(v), hi.max(v))
                    })
            })
            .collect();
        let total = self.weights.total();

        for result in results.iter_mut() {
            if !result.success {
                result.normalized_score = None;
                continue;
            }
            let weighted: f64 = ScoreComponent::ALL
                .iter()
                .zip(&bounds)
                .map(|(c, &(lo, hi))| {
                    let v = c.extract(&result.metrics);
                    let scaled = if hi - lo > 1e-12 { (v - lo) / (hi - lo) } else { 0.5 };
                    self.weights.weight(*c) * scaled
                })
                .sum();
            result.normalized_score = Some(weighted / total);
        }
    }

    /// Normalize and sort: successes by normalized score descending (ties
    /// by raw score), failures last in input order.
    pub fn rank(&self, mut results: Vec<EvaluationResult>) -> Vec<EvaluationResult> {
        self.normalize(&mut results);
        results.sort_by(|a, b| match (a.normalized_score, b.normalized_score) {
            (Some(x), Some(y)) => y
                .partial_cmp(&x)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EvaluationMetrics;
    use stratlab_core::StrategyCandidate;

    fn ok(id: &str, sharpe: f64, calmar: f64, total_return: f64) -> EvaluationResult {
        let metrics = EvaluationMetrics {
            sharpe,
            calmar,
            total_return,
            ..EvaluationMetrics::default()
        };
        let score = ScoringWeights::default().score(&metrics);
        EvaluationResult::succeeded(StrategyCandidate::new(id), score, metrics)
    }

    #[test]
    fn best_on_every_metric_scores_one() {
        let mut batch = vec![ok("lo", 0.0, 0.0, 0.0), ok("hi", 2.0, 3.0, 0.5)];
        ScoreNormalizer::default().normalize(&mut batch);
        assert_eq!(batch[0].normalized_score, Some(0.0));
        assert!((batch[1].normalized_score.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_metric_is_half() {
        let mut batch = vec![ok("a", 1.0, 1.0, 1.0), ok("b", 1.0, 1.0, 1.0)];
        ScoreNormalizer::default().normalize(&mut batch);
        assert!((batch[0].normalized_score.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rank_puts_failures_last() {
        let batch = vec![
            EvaluationResult::failed(StrategyCandidate::new("bad"), "x"),
            ok("mid", 1.0, 1.0, 0.1),
            ok("top", 2.0, 2.0, 0.2),
        ];
        let ranked = ScoreNormalizer::default().rank(batch);
        let ids: Vec<&str> = ranked.iter().map(|r| r.candidate.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "mid", "bad"]);
        assert_eq!(ranked[2].normalized_score, None);
    }

    #[test]
    fn ties_fall_back_to_raw_score() {
        // Sharpe alone (weight 0.5) against Calmar + return (0.3 + 0.2).
        let batch = vec![ok("b", 0.0, 1.0, 1.0), ok("a", 10.0, 0.0, 0.0)];
        let ranked = ScoreNormalizer::default().rank(batch);
        assert_eq!(ranked[0].normalized_score, ranked[1].normalized_score);
        assert_eq!(ranked[0].candidate.id, "a");
    }

    #[test]
    fn all_zero_weights_are_rejected() {
        let weights = ScoringWeights {
            sharpe: 0.0,
            calmar: 0.0,
            total_return: 0.0,
        };
        assert!(ScoreNormalizer::new(weights).is_err());
        assert!(ScoreNormalizer::new(ScoringWeights::default()).is_ok());
    }
}
