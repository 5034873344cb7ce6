//! Property tests for batch score normalization.
//!
//! 1. Invariance under positive affine rescaling of one metric
//! 2. Scores in [0, 1]; ranking is a permutation with failures last

use proptest::prelude::*;
use stratlab_core::StrategyCandidate;
use stratlab_runner::{EvaluationMetrics, EvaluationResult, ScoreNormalizer, ScoringWeights};

fn arb_metrics() -> impl Strategy<Value = (f64, f64, f64)> {
    (-3.0..3.0_f64, -5.0..5.0_f64, -0.9..2.0_f64)
}

fn batch(rows: &[(f64, f64, f64)]) -> Vec<EvaluationResult> {
    rows.iter()
        .enumerate()
        .map(|(i, &(sharpe, calmar, total_return))| {
            let metrics = EvaluationMetrics {
                sharpe,
                calmar,
                total_return,
                ..EvaluationMetrics::default()
            };
            let score = ScoringWeights::default().score(&metrics);
            EvaluationResult::succeeded(StrategyCandidate::new(format!("c{i}")), score, metrics)
        })
        .collect()
}

// ── 1. Affine invariance ─────────────────────────────────────────────

proptest! {
    #[test]
    fn rescaling_a_metric_does_not_change_normalized_scores(
        rows in prop::collection::vec(arb_metrics(), 2..12),
        scale in 0.01..100.0_f64,
        shift in -50.0..50.0_f64,
    ) {
        let normalizer = ScoreNormalizer::default();
        let mut original = batch(&rows);
        normalizer.normalize(&mut original);

        let rescaled_rows: Vec<(f64, f64, f64)> = rows
            .iter()
            .map(|&(s, c, r)| (s * scale + shift, c, r))
            .collect();
        let mut rescaled = batch(&rescaled_rows);
        normalizer.normalize(&mut rescaled);

        for (a, b) in original.iter().zip(&rescaled) {
            let (a, b) = (a.normalized_score.unwrap(), b.normalized_score.unwrap());
            prop_assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
        }
    }
}

// ── 2. Bounds and ranking ────────────────────────────────────────────

proptest! {
    #[test]
    fn ranked_scores_are_bounded_and_sorted(
        rows in prop::collection::vec(arb_metrics(), 1..12),
        failures in 0usize..4,
    ) {
        let mut results = batch(&rows);
        for i in 0..failures {
            results.push(EvaluationResult::failed(StrategyCandidate::new(format!("f{i}")), "x"));
        }
        let total = results.len();
        let ranked = ScoreNormalizer::default().rank(results);
        prop_assert_eq!(ranked.len(), total);

        let split = ranked.iter().position(|r| !r.success).unwrap_or(total);
        prop_assert!(ranked[split..].iter().all(|r| !r.success && r.normalized_score.is_none()));
        let scores: Vec<f64> = ranked[..split].iter().map(|r| r.normalized_score.unwrap()).collect();
        prop_assert!(scores.iter().all(|s| (-1e-12..=1.0 + 1e-12).contains(s)));
        prop_assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }
}
