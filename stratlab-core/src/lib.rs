//! StratLab Core — signal catalog, composition engine and strategy
//! candidates.
//!
//! This crate holds everything that turns a declarative strategy into
//! decisions:
//! - Domain types (bars, price series, tri-state signal series, side data)
//! - Recursive signal parameter sets
//! - Strategy candidates with structural / full content hashes
//! - Indicators and the built-in signal kinds
//! - The validated signal registry
//! - Entry (AND) / exit (OR) composition with missing-data semantics
//! - The deterministic RNG hierarchy used by every search component

pub mod candidate;
pub mod composition;
pub mod domain;
pub mod indicators;
pub mod params;
pub mod rng;
pub mod signals;

pub use candidate::{ContentHash, Side, SignalConfig, StrategyCandidate};
pub use composition::{ComposedSignals, Composer, CompositionError, CompositionReport, SkipReason};
pub use params::{ParamValue, SignalParams};
pub use signals::{
    ParamKind, ParamRange, SignalCategory, SignalDefinition, SignalError, SignalInputs,
    SignalRegistry, UsageScope,
};
