//! End-to-end: synthetic market data → reference backtester → parallel
//! evaluator → generator, evolution and sequential search → store.

use std::sync::Arc;

use chrono::NaiveDate;
use stratlab_core::{Side, SignalRegistry, StrategyCandidate};
use stratlab_runner::{
    AllocationMode, CandidateEvaluator, Evaluate, EvaluatorConfig, EvolutionConfig,
    EvolutionaryOptimizer, GeneratorConfig, PrefetchedData, SamplerKind, ScoreNormalizer,
    ScoringWeights, SearchControl, SearchHistory, SequentialConfig, SequentialOptimizer,
    SharedSettings, SignalBacktester, StoreCategory, StrategyGenerator, StrategyStore,
    SyntheticProvider,
};

fn settings() -> SharedSettings {
    SharedSettings {
        code: "SYN".into(),
        benchmark_code: Some("IDX".into()),
        sector_code: Some("SEC".into()),
        ..SharedSettings::default()
    }
}

fn setup(workers: usize) -> (Arc<SignalRegistry>, CandidateEvaluator) {
    let registry = Arc::new(SignalRegistry::builtin().unwrap());
    let provider = SyntheticProvider::new(7, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 600);
    let data = PrefetchedData::load(&provider, &settings()).unwrap();
    let evaluator = CandidateEvaluator::new(
        Arc::new(SignalBacktester::new(registry.clone())),
        settings(),
        Arc::new(data),
        ScoringWeights::default(),
        EvaluatorConfig {
            max_workers: Some(workers),
            round_timeout_secs: None,
        },
    )
    .unwrap();
    (registry, evaluator)
}

fn base(registry: &SignalRegistry) -> StrategyCandidate {
    StrategyCandidate::new("base")
        .with_signal(
            Side::Entry,
            "period_breakout",
            registry.default_params("period_breakout", Side::Entry).unwrap(),
        )
        .with_signal(
            Side::Exit,
            "trailing_stop",
            registry.default_params("trailing_stop", Side::Exit).unwrap(),
        )
}

#[test]
fn prefetched_data_includes_every_source() {
    let (_, evaluator) = setup(1);
    let data = evaluator.data();
    assert!(data.sources.benchmark.is_some());
    assert!(data.sources.sector.is_some());
    assert!(data.sources.statements.is_some());
    assert!(data.sources.margin.is_some());
    assert_eq!(data.prices.len(), 600);
}

#[test]
fn generated_batch_evaluates_identically_in_parallel() {
    let (registry, parallel) = setup(4);
    let (_, sequential) = setup(1);
    let batch = StrategyGenerator::new(registry, GeneratorConfig::default())
        .unwrap()
        .generate(12);
    assert!(!batch.is_empty());

    let a = parallel.evaluate_batch(&batch);
    let b = sequential.evaluate_batch(&batch);
    assert_eq!(a, b);
    assert!(a.iter().any(|r| r.success));

    let ranked = ScoreNormalizer::default().rank(a);
    let scores: Vec<f64> = ranked.iter().filter_map(|r| r.normalized_score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
}

#[test]
fn agnostic_and_optimized_runs_both_succeed() {
    let (registry, evaluator) = setup(1);
    let candidate = base(&registry);
    let agnostic = evaluator.evaluate(&candidate, AllocationMode::Agnostic);
    let optimized = evaluator.evaluate(&candidate, AllocationMode::Optimized);
    assert!(agnostic.success, "{:?}", agnostic.error);
    assert!(optimized.success, "{:?}", optimized.error);
}

#[test]
fn searches_run_and_persist() {
    let (registry, evaluator) = setup(2);
    let base = base(&registry);

    let evolution = EvolutionaryOptimizer::new(
        registry.clone(),
        EvolutionConfig {
            population_size: 6,
            generations: 2,
            ..EvolutionConfig::default()
        },
    )
    .unwrap()
    .run(&base, &evaluator, SearchControl::default())
    .unwrap();
    assert_eq!(evolution.history.len(), 2);

    let sequential = SequentialOptimizer::new(
        registry.clone(),
        SequentialConfig {
            n_trials: 6,
            sampler: SamplerKind::Random,
            ..SequentialConfig::default()
        },
    )
    .unwrap()
    .run(&base, &evaluator, SearchControl::default())
    .unwrap();
    assert_eq!(sequential.trials.len(), 6);

    let tmp = tempfile::tempdir().unwrap();
    let store = StrategyStore::new(tmp.path().join("production"), tmp.path().join("experimental"));
    let best = sequential.best_candidate();
    store.save_candidate(StoreCategory::Experimental, best).unwrap();
    store
        .save_history(
            StoreCategory::Experimental,
            &best.id,
            &SearchHistory::from_sequential(&base, &sequential),
        )
        .unwrap();
    assert_eq!(
        store.load_candidate(StoreCategory::Experimental, &best.id).unwrap(),
        *best
    );
    assert_eq!(
        store
            .load_history(StoreCategory::Experimental, &best.id)
            .unwrap()
            .trials
            .len(),
        6
    );
    let evo_history = SearchHistory::from_evolution(&base, &evolution);
    assert_eq!(evo_history.generations.len(), 2);
}
