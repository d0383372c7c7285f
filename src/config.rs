// src/config.rs
//
// TOML configuration with defaults for every field. Paths are relative to the
// repository root and double as in-repository paths for git lookups.

use crate::error::{RegressError, Result};
use crate::model::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "sim-regress.toml";
pub const SIMULATOR_ENV: &str = "SIM_REGRESS_SIMULATOR";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub run: RunConfig,
    pub history: HistoryConfig,
    pub diff: DiffConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub simulator: PathBuf,
    pub dumps_dir: String,
    pub new_results: String,
    pub baseline_results: String,
    pub history: String,
    pub pending: String,
    pub data_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let simulator = if cfg!(windows) { "simulator.exe" } else { "simulator" };
        Self {
            simulator: PathBuf::from(simulator),
            dumps_dir: "tests/dumps".into(),
            new_results: "tests/new_results.json".into(),
            baseline_results: "tests/current_results.json".into(),
            history: "tests/test_history.json".into(),
            pending: "tests/test_history_pending.json".into(),
            data_dir: "data/chars".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Worker count, 0 means one per hardware thread
    pub jobs: usize,
    pub timeout_secs: Option<u64>,
    pub ignored_error_types: BTreeSet<ErrorCode>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { jobs: 0, timeout_secs: None, ignored_error_types: BTreeSet::from([1, 2, 3, 4]) }
    }
}

impl RunConfig {
    pub fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Explicit upstream revision; defaults to the current branch's tracking branch
    pub upstream: Option<String>,
}

/// A hit-stun relationship between two param entries of the same hit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitStunCheck {
    pub left: String,
    pub right: String,
    pub expected: i64,
    pub description: String,
}

impl HitStunCheck {
    fn new(left: &str, right: &str, expected: i64, description: &str) -> Self {
        Self { left: left.into(), right: right.into(), expected, description: description.into() }
    }
}

/// Param entry compared between versions, with a label for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamEntry {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Fields that change between builds without meaning anything
    pub ignored_fields: BTreeSet<String>,
    /// Moves whose block stun legitimately breaks the timing checks
    pub follow_up_moves: BTreeSet<String>,
    pub active_collision_types: BTreeSet<i64>,
    pub param_entries: Vec<ParamEntry>,
    pub scaling_fields: Vec<String>,
    pub hit_stun_checks: Vec<HitStunCheck>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        let entry = |key: &str, label: &str| ParamEntry { key: key.into(), label: label.into() };
        Self {
            ignored_fields: BTreeSet::from(["CurveOwnID".into(), "CurveTgtID".into()]),
            follow_up_moves: BTreeSet::from(["ATK_CTA(1)".into()]),
            active_collision_types: BTreeSet::from([0, 1]),
            param_entries: vec![
                entry("00", "hit"),
                entry("16", "block"),
                entry("02", "air hit"),
                entry("04", "burnout block"),
                entry("08", "counter"),
                entry("12", "punish counter"),
            ],
            scaling_fields: vec!["ComboScaling".into(), "InstScaling".into(), "_StartScaling".into()],
            hit_stun_checks: vec![
                HitStunCheck::new("04", "16", -4, "burnout stand block vs stand block"),
                HitStunCheck::new("16", "17", 0, "stand block vs crouch block"),
                HitStunCheck::new("04", "05", 0, "burnout stand block vs burnout crouch block"),
                HitStunCheck::new("00", "01", 0, "stand hit vs crouch hit"),
                HitStunCheck::new("08", "09", 0, "stand counter vs crouch counter"),
                HitStunCheck::new("12", "13", 0, "stand PC vs crouch PC"),
                HitStunCheck::new("00", "08", 2, "stand hit vs stand counter"),
                HitStunCheck::new("00", "12", 4, "stand hit vs stand PC"),
            ],
        }
    }
}

impl Config {
    /// Loads `explicit` if given (it must exist), otherwise `sim-regress.toml`
    /// under `root` when present, otherwise defaults. Env overrides apply last.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let candidate = root.join(DEFAULT_CONFIG_FILE);
                if candidate.is_file() { Self::from_file(&candidate)? } else { Self::default() }
            }
        };
        if let Ok(simulator) = env::var(SIMULATOR_ENV) {
            if !simulator.is_empty() {
                config.paths.simulator = PathBuf::from(simulator);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| RegressError::io(path, e))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RegressError::Config { details: e.to_string() })
    }

    fn validate(&self) -> Result<()> {
        if self.run.timeout_secs == Some(0) {
            return Err(RegressError::Config { details: "run.timeout_secs must be positive".into() });
        }
        if self.paths.dumps_dir.is_empty() || self.paths.baseline_results.is_empty() {
            return Err(RegressError::Config { details: "paths must not be empty".into() });
        }
        Ok(())
    }
}
