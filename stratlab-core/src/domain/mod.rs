//! Domain types for StratLab: bars, date-indexed series, side data sources.

pub mod bar;
pub mod series;
pub mod sources;

pub use bar::Bar;
pub use series::{DecisionSeries, PriceSeries, SignalSeries};
pub use sources::{DataRequirement, DataSources, DatedTable, UnknownRequirement};
