//! StratLab CLI — list the signal catalog, generate random strategies and
//! run evolutionary or sequential searches against one instrument.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stratlab_core::{Side, SignalRegistry, StrategyCandidate};
use stratlab_runner::Evaluate;
use stratlab_runner::{
    load_candidate_file, summary_by_signal, CandidateEvaluator, CsvDataProvider,
    EvaluationResult, EvolutionaryOptimizer, MarketDataProvider, PrefetchedData,
    ResearchConfig, SamplerKind, ScoreNormalizer, SearchControl, SearchHistory, SearchProgress,
    SequentialOptimizer, SignalBacktester, StoreCategory, StrategyGenerator, StrategyStore,
    SyntheticProvider, TrialState,
};

/// Trading days of synthetic history when no data directory is given.
const SYNTHETIC_DAYS: usize = 1500;

#[derive(Parser)]
#[command(name = "stratlab", about = "StratLab — signal strategy research")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Research config (TOML). Missing tables use defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of per-code CSV files.
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    /// Use generated market data instead of CSV files.
    #[arg(long, global = true)]
    synthetic: bool,

    /// Instrument code (overrides the config).
    #[arg(long, global = true)]
    code: Option<String>,

    /// Seed for generator and optimizers (overrides the config).
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Store the best strategy (and search history) in this category.
    #[arg(long, global = true, value_enum)]
    save: Option<SaveTarget>,

    /// Print results as JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered signals with their categories and search ranges.
    Signals {
        /// Only signals usable on this side.
        #[arg(long, value_enum)]
        side: Option<SideArg>,
    },
    /// Generate random strategies, evaluate and rank them.
    Generate {
        /// Number of candidates.
        #[arg(long, default_value_t = 20)]
        count: usize,

        /// Ranked rows to print.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Evolve a base strategy.
    Evolve {
        /// Base strategy file (TOML).
        #[arg(long)]
        base: PathBuf,

        #[arg(long)]
        population: Option<usize>,

        #[arg(long)]
        generations: Option<usize>,
    },
    /// Tune the parameters of a base strategy trial by trial.
    Optimize {
        /// Base strategy file (TOML).
        #[arg(long)]
        base: PathBuf,

        #[arg(long)]
        trials: Option<usize>,

        #[arg(long, value_enum)]
        sampler: Option<SamplerArg>,

        /// Disable two-stage pruning.
        #[arg(long)]
        no_pruning: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Entry,
    Exit,
}

impl From<SideArg> for Side {
    fn from(arg: SideArg) -> Self {
        match arg {
            SideArg::Entry => Side::Entry,
            SideArg::Exit => Side::Exit,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SamplerArg {
    Tpe,
    Random,
    Es,
}

impl From<SamplerArg> for SamplerKind {
    fn from(arg: SamplerArg) -> Self {
        match arg {
            SamplerArg::Tpe => SamplerKind::Tpe,
            SamplerArg::Random => SamplerKind::Random,
            SamplerArg::Es => SamplerKind::EvolutionStrategy,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SaveTarget {
    Experimental,
    Production,
}

impl From<SaveTarget> for StoreCategory {
    fn from(arg: SaveTarget) -> Self {
        match arg {
            SaveTarget::Experimental => StoreCategory::Experimental,
            SaveTarget::Production => StoreCategory::Production,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.common.verbose);

    let registry = Arc::new(SignalRegistry::builtin().context("failed to build signal registry")?);
    let config = load_config(&cli.common)?;

    match cli.command {
        Commands::Signals { side } => {
            list_signals(&registry, side.map(Side::from));
            Ok(())
        }
        Commands::Generate { count, top } => run_generate(&cli.common, config, registry, count, top),
        Commands::Evolve {
            base,
            population,
            generations,
        } => run_evolve(&cli.common, config, registry, &base, population, generations),
        Commands::Optimize {
            base,
            trials,
            sampler,
            no_pruning,
        } => run_optimize(&cli.common, config, registry, &base, trials, sampler, no_pruning),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file (or defaults) with command-line overrides applied.
fn load_config(common: &CommonArgs) -> Result<ResearchConfig> {
    let mut config = match &common.config {
        Some(path) => ResearchConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ResearchConfig::default(),
    };
    if let Some(code) = &common.code {
        config.settings.code = code.clone();
    }
    if common.synthetic {
        let s = &mut config.settings;
        if s.code.is_empty() {
            s.code = "SYN".into();
        }
        s.benchmark_code.get_or_insert_with(|| "IDX".into());
        s.sector_code.get_or_insert_with(|| "SEC".into());
    }
    if let Some(seed) = common.seed {
        config.generator.seed = seed;
        config.evolution.seed = seed;
        config.sequential.seed = seed;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn build_evaluator(
    common: &CommonArgs,
    config: &ResearchConfig,
    registry: Arc<SignalRegistry>,
) -> Result<CandidateEvaluator> {
    if config.settings.code.is_empty() {
        bail!("no instrument code: pass --code or set settings.code in the config");
    }
    let provider: Box<dyn MarketDataProvider> = if common.synthetic {
        let start = config
            .settings
            .start_date
            .or_else(|| NaiveDate::from_ymd_opt(2018, 1, 1))
            .context("invalid synthetic start date")?;
        Box::new(SyntheticProvider::new(
            common.seed.unwrap_or(config.generator.seed),
            start,
            SYNTHETIC_DAYS,
        ))
    } else {
        Box::new(CsvDataProvider::new(&common.data_dir))
    };

    let data = PrefetchedData::load(provider.as_ref(), &config.settings)
        .with_context(|| format!("failed to load market data for {}", config.settings.code))?;
    info!(
        code = %config.settings.code,
        bars = data.prices.len(),
        "market data loaded"
    );

    CandidateEvaluator::new(
        Arc::new(SignalBacktester::new(registry)),
        config.settings.clone(),
        Arc::new(data),
        config.scoring,
        config.evaluator,
    )
    .context("failed to build evaluator")
}

fn open_store() -> Result<StrategyStore> {
    let cwd = std::env::current_dir().context("cannot read working directory")?;
    StrategyStore::for_project(&cwd).context("cannot locate strategy store")
}

fn progress_printer(label: &'static str) -> impl Fn(&SearchProgress) {
    move |p: &SearchProgress| {
        let best = p
            .best_score
            .map_or_else(|| "-".to_string(), |s| format!("{s:.4}"));
        eprintln!("[{label}] {}/{}  best {best}", p.completed, p.total);
    }
}

// ─── Commands ────────────────────────────────────────────────────────

fn list_signals(registry: &SignalRegistry, side: Option<Side>) {
    println!("{:<24} {:<12} {:<6} {:<10} Ranges", "Signal", "Category", "Usage", "Requires");
    for def in registry.definitions() {
        if side.map_or(false, |s| !def.usable_on(s)) {
            continue;
        }
        let requires = if def.data_requirements.is_empty() {
            "-".to_string()
        } else {
            def.data_requirements
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        let usage = if def.exit_disabled {
            "entry".to_string()
        } else {
            def.usage.to_string()
        };
        let ranges = def
            .param_ranges
            .iter()
            .map(|(path, r)| format!("{path}=[{}, {}]", r.min, r.max))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{:<24} {:<12} {:<6} {:<10} {}",
            def.name,
            def.category.to_string(),
            usage,
            requires,
            ranges
        );
    }
}

fn run_generate(
    common: &CommonArgs,
    config: ResearchConfig,
    registry: Arc<SignalRegistry>,
    count: usize,
    top: usize,
) -> Result<()> {
    let evaluator = build_evaluator(common, &config, registry.clone())?;
    let mut generator = StrategyGenerator::new(registry, config.generator.clone())
        .context("invalid generator configuration")?;

    let batch = generator.generate(count);
    if batch.is_empty() {
        bail!("generator produced no candidates");
    }
    info!(count = batch.len(), "evaluating generated batch");
    let results = evaluator.evaluate_batch(&batch);
    let ranked = ScoreNormalizer::new(config.scoring)
        .context("invalid scoring weights")?
        .rank(results);

    if common.json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
    } else {
        print_ranking(&ranked, top);
        println!();
        println!("--- By Signal ---");
        for (key, s) in summary_by_signal(&ranked) {
            println!(
                "{key:<32} n={:<3} mean {:>8.4}  best {:>8.4}",
                s.count, s.mean_score, s.best_score
            );
        }
    }

    if let Some(target) = common.save {
        let best = ranked
            .iter()
            .find(|r| r.success)
            .context("no candidate evaluated successfully; nothing to save")?;
        save_candidate(target.into(), &best.candidate, None)?;
    }
    Ok(())
}

fn run_evolve(
    common: &CommonArgs,
    mut config: ResearchConfig,
    registry: Arc<SignalRegistry>,
    base_path: &Path,
    population: Option<usize>,
    generations: Option<usize>,
) -> Result<()> {
    if let Some(n) = population {
        config.evolution.population_size = n;
    }
    if let Some(n) = generations {
        config.evolution.generations = n;
    }
    let base = load_candidate_file(base_path)
        .with_context(|| format!("failed to load base strategy {}", base_path.display()))?;
    let evaluator = build_evaluator(common, &config, registry.clone())?;

    let mut optimizer = EvolutionaryOptimizer::new(registry, config.evolution.clone())
        .context("invalid evolution configuration")?;
    let progress = progress_printer("evolve");
    let outcome = optimizer
        .run(&base, &evaluator, SearchControl::new(Some(&progress), None))
        .context("evolution failed")?;
    let history = SearchHistory::from_evolution(&base, &outcome);

    if common.json {
        println!("{}", serde_json::to_string_pretty(&history)?);
    } else {
        println!("=== Evolution ===");
        println!("Base:           {}", base.id);
        println!("Generations:    {}", outcome.history.len());
        println!("Elapsed:        {:.1}s", outcome.elapsed_secs);
        println!();
        println!("--- Progress ---");
        for g in &outcome.history {
            println!(
                "gen {:>3}  best {:>8.4}  mean {:>8.4}  survivors {:>3}  evaluated {:>3}",
                g.generation, g.best_score, g.mean_score, g.survivors, g.evaluated
            );
        }
        println!();
        print_summary(&outcome.best);
    }

    if let Some(target) = common.save {
        save_candidate(target.into(), outcome.best_candidate(), Some(&history))?;
    }
    Ok(())
}

fn run_optimize(
    common: &CommonArgs,
    mut config: ResearchConfig,
    registry: Arc<SignalRegistry>,
    base_path: &Path,
    trials: Option<usize>,
    sampler: Option<SamplerArg>,
    no_pruning: bool,
) -> Result<()> {
    if let Some(n) = trials {
        config.sequential.n_trials = n;
    }
    if let Some(s) = sampler {
        config.sequential.sampler = s.into();
    }
    if no_pruning {
        config.sequential.pruning = false;
    }
    let base = load_candidate_file(base_path)
        .with_context(|| format!("failed to load base strategy {}", base_path.display()))?;
    let evaluator = build_evaluator(common, &config, registry.clone())?;

    let mut optimizer = SequentialOptimizer::new(registry, config.sequential.clone())
        .context("invalid sequential configuration")?;
    let progress = progress_printer("optimize");
    let outcome = optimizer
        .run(&base, &evaluator, SearchControl::new(Some(&progress), None))
        .context("optimization failed")?;
    let history = SearchHistory::from_sequential(&base, &outcome);

    if common.json {
        println!("{}", serde_json::to_string_pretty(&history)?);
    } else {
        println!("=== Sequential Optimization ===");
        println!("Base:           {}", base.id);
        println!("Sampler:        {}", outcome.sampler);
        println!(
            "Trials:         {} complete, {} pruned, {} failed",
            outcome.count(TrialState::Complete),
            outcome.count(TrialState::Pruned),
            outcome.count(TrialState::Failed)
        );
        println!("Elapsed:        {:.1}s", outcome.elapsed_secs);
        if !outcome.best_params.is_empty() {
            println!();
            println!("--- Best Parameters ---");
            for (name, value) in &outcome.best_params {
                println!("{name:<40} {value}");
            }
        }
        println!();
        print_summary(&outcome.best);
    }

    if let Some(target) = common.save {
        save_candidate(target.into(), outcome.best_candidate(), Some(&history))?;
    }
    Ok(())
}

// ─── Output ──────────────────────────────────────────────────────────

fn print_ranking(ranked: &[EvaluationResult], top: usize) {
    println!("=== Ranking ===");
    println!(
        "{:<4} {:<20} {:>8} {:>8} {:>8} {:>9} {:>7}  Signals",
        "#", "Id", "Norm", "Score", "Sharpe", "Return", "Trades"
    );
    for (i, r) in ranked.iter().take(top).enumerate() {
        if !r.success {
            println!(
                "{:<4} {:<20} failed: {}",
                i + 1,
                r.candidate.id,
                r.error.as_deref().unwrap_or("unknown error")
            );
            continue;
        }
        println!(
            "{:<4} {:<20} {:>8.4} {:>8.4} {:>8.2} {:>8.2}% {:>7}  {}",
            i + 1,
            r.candidate.id,
            r.normalized_score.unwrap_or(0.0),
            r.score,
            r.metrics.sharpe,
            r.metrics.total_return * 100.0,
            r.metrics.trade_count,
            describe(&r.candidate)
        );
    }
    let failed = ranked.iter().filter(|r| !r.success).count();
    if failed > 0 {
        println!("({failed} of {} candidates failed)", ranked.len());
    }
}

fn print_summary(result: &EvaluationResult) {
    println!("--- Best Strategy ---");
    println!("Id:             {}", result.candidate.id);
    println!("Signals:        {}", describe(&result.candidate));
    println!("Score:          {:.4}", result.score);
    let m = &result.metrics;
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Calmar:         {:.3}", m.calmar);
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Trades:         {}", m.trade_count);
}

/// `entry: a + b | exit: c`
fn describe(candidate: &StrategyCandidate) -> String {
    let join = |side| candidate.enabled_signals(side).join(" + ");
    format!("entry: {} | exit: {}", join(Side::Entry), join(Side::Exit))
}

fn save_candidate(
    category: StoreCategory,
    candidate: &StrategyCandidate,
    history: Option<&SearchHistory>,
) -> Result<()> {
    let store = open_store()?;
    let path = store
        .save_candidate(category, candidate)
        .with_context(|| format!("failed to save {}", candidate.id))?;
    if let Some(history) = history {
        store
            .save_history(category, &candidate.id, history)
            .with_context(|| format!("failed to save history of {}", candidate.id))?;
    }
    println!();
    println!("Saved {} to {}", candidate.id, path.display());
    Ok(())
}
