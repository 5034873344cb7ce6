//! Sequential (model-based) parameter optimizer.
//!
//! The signal set is fixed by a base candidate (optionally extended in
//! random-add mode); each trial samples one value per searchable numeric
//! parameter, assembles a candidate and evaluates it. With pruning on, a
//! trial first runs allocation-agnostic for a provisional score and stops
//! there if the pruner flags it.

pub mod optimizer;
pub mod pruner;
pub mod sampler;
pub mod search_space;

pub use optimizer::{
    SequentialConfig, SequentialOptimizer, SequentialOutcome, StructureMode, TrialRecord,
    TrialState, FAILED_TRIAL_SCORE,
};
pub use pruner::{MedianPruner, Pruner};
pub use sampler::{EvolutionStrategySampler, RandomSampler, Sampler, SamplerKind, TpeSampler};
pub use search_space::{trial_name, ParamAssignment, SearchParam, SearchSpace};
