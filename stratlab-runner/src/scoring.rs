//! Composite score — weighted fold of backtest metrics into one scalar.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::evaluator::EvaluationMetrics;

/// Metrics that contribute to the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreComponent {
    Sharpe,
    Calmar,
    TotalReturn,
}

impl ScoreComponent {
    pub const ALL: [ScoreComponent; 3] = [Self::Sharpe, Self::Calmar, Self::TotalReturn];

    pub fn extract(&self, metrics: &EvaluationMetrics) -> f64 {
        match self {
            Self::Sharpe => metrics.sharpe,
            Self::Calmar => metrics.calmar,
            Self::TotalReturn => metrics.total_return,
        }
    }
}

/// Weights of each component. Defaults: Sharpe 0.5, Calmar 0.3, total
/// return 0.2.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub sharpe: f64,
    pub calmar: f64,
    pub total_return: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            sharpe: 0.5,
            calmar: 0.3,
            total_return: 0.2,
        }
    }
}

impl ScoringWeights {
    pub fn weight(&self, component: ScoreComponent) -> f64 {
        match component {
            ScoreComponent::Sharpe => self.sharpe,
            ScoreComponent::Calmar => self.calmar,
            ScoreComponent::TotalReturn => self.total_return,
        }
    }

    pub fn total(&self) -> f64 {
        self.sharpe + self.calmar + self.total_return
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for c in ScoreComponent::ALL {
            let w = self.weight(c);
            if !(w.is_finite() && w >= 0.0) {
                return Err(ConfigError::invalid(
                    "scoring",
                    format!("weight for {c:?} must be finite and non-negative"),
                ));
            }
        }
        if self.total() <= 0.0 {
            return Err(ConfigError::invalid("scoring", "weights must not all be zero"));
        }
        Ok(())
    }

    /// Raw composite score. May be non-finite if a metric is.
    pub fn score(&self, metrics: &EvaluationMetrics) -> f64 {
        ScoreComponent::ALL
            .iter()
            .map(|c| self.weight(*c) * c.extract(metrics))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(sharpe: f64, calmar: f64, total_return: f64) -> EvaluationMetrics {
        EvaluationMetrics {
            sharpe,
            calmar,
            total_return,
            ..EvaluationMetrics::default()
        }
    }

    #[test]
    fn default_weights() {
        let w = ScoringWeights::default();
        assert!((w.score(&metrics(1.0, 1.0, 1.0)) - 1.0).abs() < 1e-12);
        assert!((w.score(&metrics(2.0, 0.0, 0.0)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn nan_metric_yields_nan_score() {
        assert!(ScoringWeights::default()
            .score(&metrics(f64::NAN, 0.0, 0.0))
            .is_nan());
    }

    #[test]
    fn negative_or_zero_weights_rejected() {
        let w = ScoringWeights {
            sharpe: -1.0,
            ..ScoringWeights::default()
        };
        assert!(w.validate().is_err());
        let zero = ScoringWeights {
            sharpe: 0.0,
            calmar: 0.0,
            total_return: 0.0,
        };
        assert!(zero.validate().is_err());
    }
}
