//! Strategy candidates — the configuration object exchanged by every search
//! component.
//!
//! - `StrategyCandidate`: id, entry signals (AND-composed), exit signals
//!   (OR-composed), shared-setting overrides, metadata.
//! - `structure_hash()`: enabled signal names per side, no parameter values.
//! - `full_hash()`: structure + all parameters + overrides. The id and
//!   metadata are excluded, so two candidates that would trade identically
//!   hash identically.
//!
//! Candidates are values: search operators clone and modify, they never
//! mutate a candidate that has been handed to an evaluator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::params::{ParamValue, SignalParams};

/// Signal name → parameter set for one side. `BTreeMap` for stable hashing.
pub type SignalConfig = BTreeMap<String, SignalParams>;

/// Metadata key recording the id a candidate was derived from.
pub const PARENT_KEY: &str = "parent";

// ─── Side ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Entry,
    Exit,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Entry, Side::Exit];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Self::Entry),
            "exit" => Ok(Self::Exit),
            other => Err(format!("unknown side '{other}' (expected entry or exit)")),
        }
    }
}

// ─── ContentHash ─────────────────────────────────────────────────────

/// Hex-encoded BLAKE3 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── StrategyCandidate ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyCandidate {
    pub id: String,
    #[serde(default)]
    pub entry: SignalConfig,
    #[serde(default)]
    pub exit: SignalConfig,
    /// Overrides applied over the shared backtest settings for this candidate.
    #[serde(default)]
    pub shared_overrides: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl StrategyCandidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry: SignalConfig::new(),
            exit: SignalConfig::new(),
            shared_overrides: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Builder-style signal insert.
    pub fn with_signal(mut self, side: Side, name: &str, params: SignalParams) -> Self {
        self.side_mut(side).insert(name.to_string(), params);
        self
    }

    pub fn side(&self, side: Side) -> &SignalConfig {
        match side {
            Side::Entry => &self.entry,
            Side::Exit => &self.exit,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut SignalConfig {
        match side {
            Side::Entry => &mut self.entry,
            Side::Exit => &mut self.exit,
        }
    }

    /// Names of enabled signals on `side`, in name order.
    pub fn enabled_signals(&self, side: Side) -> Vec<&str> {
        self.side(side)
            .iter()
            .filter(|(_, p)| p.enabled())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Enabled signals across both sides.
    pub fn enabled_count(&self) -> usize {
        Side::ALL
            .iter()
            .map(|side| self.enabled_signals(*side).len())
            .sum()
    }

    /// Copy under a new id, recording `self.id` as the parent.
    pub fn derive(&self, id: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.id = id.into();
        child
            .metadata
            .insert(PARENT_KEY.to_string(), self.id.clone());
        child
    }

    /// Structural hash: enabled signal names per side, no parameters.
    pub fn structure_hash(&self) -> ContentHash {
        let structural = format!(
            "entry:{}|exit:{}",
            self.enabled_signals(Side::Entry).join(","),
            self.enabled_signals(Side::Exit).join(","),
        );
        ContentHash::from_bytes(structural.as_bytes())
    }

    /// Full hash: both sides with every parameter, plus overrides.
    pub fn full_hash(&self) -> ContentHash {
        #[derive(Serialize)]
        struct Canonical<'a> {
            entry: &'a SignalConfig,
            exit: &'a SignalConfig,
            shared_overrides: &'a BTreeMap<String, ParamValue>,
        }
        // String-keyed maps of plain values always serialize.
        let json = serde_json::to_vec(&Canonical {
            entry: &self.entry,
            exit: &self.exit,
            shared_overrides: &self.shared_overrides,
        })
        .unwrap_or_default();
        ContentHash::from_bytes(&json)
    }
}
