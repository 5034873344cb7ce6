//! Strategy store — candidates and search histories as commented TOML.
//!
//! Two categories map to two directories. Production strategies live with
//! the project; experimental output goes outside it, under
//! `$STRATLAB_HOME` or the platform data directory.
//!
//! ```text
//! <dir>/<id>.toml          candidate
//! <dir>/<id>.history.toml  search history that produced it
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use stratlab_core::{Side, StrategyCandidate};

use crate::history::SearchHistory;

/// Environment variable overriding the experimental root.
pub const HOME_ENV: &str = "STRATLAB_HOME";

const HISTORY_SUFFIX: &str = ".history.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreCategory {
    Production,
    Experimental,
}

impl StoreCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Experimental => "experimental",
        }
    }
}

impl fmt::Display for StoreCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Self::Production),
            "experimental" => Ok(Self::Experimental),
            other => Err(format!(
                "unknown store category '{other}' (expected production or experimental)"
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("candidate id '{0}' is not a valid file name")]
    InvalidId(String),

    #[error("no data directory available; set {HOME_ENV}")]
    NoHome,
}

/// `$STRATLAB_HOME`, else `<data dir>/stratlab`.
pub fn stratlab_home() -> Result<PathBuf, StoreError> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::data_local_dir()
        .map(|d| d.join("stratlab"))
        .ok_or(StoreError::NoHome)
}

#[derive(Debug, Clone)]
pub struct StrategyStore {
    production: PathBuf,
    experimental: PathBuf,
}

impl StrategyStore {
    pub fn new(production: impl Into<PathBuf>, experimental: impl Into<PathBuf>) -> Self {
        Self {
            production: production.into(),
            experimental: experimental.into(),
        }
    }

    /// Production under `<project>/strategies/production`, experimental
    /// under `<stratlab home>/experimental`.
    pub fn for_project(project_root: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(
            project_root.join("strategies").join("production"),
            stratlab_home()?.join("experimental"),
        ))
    }

    pub fn dir(&self, category: StoreCategory) -> &Path {
        match category {
            StoreCategory::Production => &self.production,
            StoreCategory::Experimental => &self.experimental,
        }
    }

    fn path_for(&self, category: StoreCategory, id: &str, suffix: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && !id.contains(['/', '\\'])
            && !id.contains("..");
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir(category).join(format!("{id}{suffix}")))
    }

    pub fn save_candidate(
        &self,
        category: StoreCategory,
        candidate: &StrategyCandidate,
    ) -> Result<PathBuf, StoreError> {
        let path = self.path_for(category, &candidate.id, ".toml")?;
        let header = format!(
            "# StratLab strategy candidate\n# id: {}\n# saved: {}\n# entry: {}\n# exit: {}\n# structure: {}\n\n",
            candidate.id,
            Utc::now().to_rfc3339(),
            candidate.enabled_signals(Side::Entry).join(", "),
            candidate.enabled_signals(Side::Exit).join(", "),
            candidate.structure_hash().short(),
        );
        let body = toml::to_string(candidate)?;
        write_file(&path, &(header + &body))?;
        info!(id = %candidate.id, %category, path = %path.display(), "candidate saved");
        Ok(path)
    }

    pub fn load_candidate(&self, category: StoreCategory, id: &str) -> Result<StrategyCandidate, StoreError> {
        let path = self.path_for(category, id, ".toml")?;
        load_candidate_file(&path)
    }

    pub fn save_history(
        &self,
        category: StoreCategory,
        id: &str,
        history: &SearchHistory,
    ) -> Result<PathBuf, StoreError> {
        let path = self.path_for(category, id, HISTORY_SUFFIX)?;
        let header = format!(
            "# StratLab search history\n# search: {:?}\n# base: {}\n# best: {} ({:.4})\n\n",
            history.kind, history.base_id, history.best_id, history.best_score,
        );
        let body = toml::to_string(history)?;
        write_file(&path, &(header + &body))?;
        info!(id, %category, path = %path.display(), "history saved");
        Ok(path)
    }

    pub fn load_history(&self, category: StoreCategory, id: &str) -> Result<SearchHistory, StoreError> {
        let path = self.path_for(category, id, HISTORY_SUFFIX)?;
        let text = read_file(&path)?;
        toml::from_str(&text).map_err(|source| StoreError::Parse { path, source })
    }

    /// Ids of stored candidates, sorted. A missing directory is empty.
    pub fn list(&self, category: StoreCategory) -> Result<Vec<String>, StoreError> {
        let dir = self.dir(category);
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };
        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.ends_with(HISTORY_SUFFIX))
            .filter_map(|name| name.strip_suffix(".toml").map(String::from))
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Load a candidate from any TOML file (e.g. a hand-written base).
pub fn load_candidate_file(path: &Path) -> Result<StrategyCandidate, StoreError> {
    let text = read_file(path)?;
    toml::from_str(&text).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn read_file(path: &Path) -> Result<String, StoreError> {
    fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, contents).map_err(io_err)
}
