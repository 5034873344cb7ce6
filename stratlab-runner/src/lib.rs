//! StratLab Runner — candidate evaluation, generation and search.
//!
//! This crate builds on `stratlab-core` to provide:
//! - Market data providers (CSV directory, synthetic) and one-time prefetch
//! - The reference backtest oracle and its performance metrics
//! - Composite scoring, batch normalization and the parallel evaluator
//! - The constrained random strategy generator
//! - Evolutionary and sequential (model-based) optimizers
//! - Search histories and the production / experimental strategy store

pub mod backtest;
pub mod config;
pub mod data;
pub mod evaluator;
pub mod evolution;
pub mod generator;
pub mod history;
pub mod metrics;
pub mod normalizer;
pub mod oracle;
pub mod persistence;
pub mod progress;
pub mod scoring;
pub mod sequential;
pub mod settings;

pub use backtest::{kelly_allocation, SignalBacktester};
pub use config::{ConfigError, ResearchConfig};
pub use data::{
    CsvDataProvider, DataError, DateRange, MarketDataProvider, PrefetchedData, SyntheticProvider,
};
pub use evaluator::{
    CandidateEvaluator, Evaluate, EvaluationMetrics, EvaluationResult, EvaluatorConfig,
};
pub use evolution::{
    crossover, mutate, EvolutionConfig, EvolutionOutcome, EvolutionaryOptimizer, GenerationRecord,
};
pub use generator::{
    randomized_params, CountRange, GenerateError, GeneratorConfig, SideRestriction,
    StrategyGenerator,
};
pub use history::{summary_by_signal, SearchHistory, SearchKind, SignalSummary};
pub use metrics::{PerformanceMetrics, TradeRecord};
pub use normalizer::ScoreNormalizer;
pub use oracle::{AllocationMode, BacktestOracle, OracleError, OracleReport};
pub use persistence::{load_candidate_file, StoreCategory, StoreError, StrategyStore};
pub use progress::{SearchControl, SearchError, SearchProgress};
pub use scoring::{ScoreComponent, ScoringWeights};
pub use sequential::{
    SamplerKind, SequentialConfig, SequentialOptimizer, SequentialOutcome, StructureMode,
    TrialRecord, TrialState, FAILED_TRIAL_SCORE,
};
pub use settings::SharedSettings;

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn evaluation_types_are_send_sync() {
        assert_send::<EvaluationResult>();
        assert_sync::<EvaluationResult>();
        assert_send::<CandidateEvaluator>();
        assert_sync::<CandidateEvaluator>();
        assert_send::<PrefetchedData>();
        assert_sync::<PrefetchedData>();
    }

    #[test]
    fn oracle_is_send_sync() {
        assert_send::<SignalBacktester>();
        assert_sync::<SignalBacktester>();
        assert_send::<OracleReport>();
        assert_sync::<OracleReport>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<ResearchConfig>();
        assert_sync::<ResearchConfig>();
        assert_send::<SharedSettings>();
        assert_sync::<SharedSettings>();
    }

    #[test]
    fn optimizers_are_send() {
        assert_send::<StrategyGenerator>();
        assert_send::<EvolutionaryOptimizer>();
        assert_send::<SequentialOptimizer>();
    }
}
