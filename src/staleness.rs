// src/staleness.rs
//
// Coarse mtime-based invalidation of cached run results. Equal timestamps
// count as fresh.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    Stale(StaleReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    Forced,
    MissingArtifact,
    BinaryNewer,
    InputNewer(PathBuf),
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Staleness::Stale(_))
    }
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Forced => write!(f, "forced rerun"),
            StaleReason::MissingArtifact => write!(f, "no previous results"),
            StaleReason::BinaryNewer => write!(f, "simulator binary changed"),
            StaleReason::InputNewer(path) => write!(f, "{} changed", path.display()),
        }
    }
}

/// Pure decision over already-collected modification times.
pub fn evaluate(
    artifact: Option<SystemTime>,
    binary: Option<SystemTime>,
    inputs: &[(PathBuf, SystemTime)],
    forced: bool,
) -> Staleness {
    if forced {
        return Staleness::Stale(StaleReason::Forced);
    }
    let Some(artifact) = artifact else {
        return Staleness::Stale(StaleReason::MissingArtifact);
    };
    if binary.is_some_and(|b| b > artifact) {
        return Staleness::Stale(StaleReason::BinaryNewer);
    }
    match inputs.iter().find(|(_, modified)| *modified > artifact) {
        Some((path, _)) => Staleness::Stale(StaleReason::InputNewer(path.clone())),
        None => Staleness::Fresh,
    }
}

/// Stats the given files and evaluates them. Unreadable inputs are ignored.
pub fn check(artifact: &Path, binary: &Path, inputs: &[PathBuf], forced: bool) -> Staleness {
    let input_times: Vec<(PathBuf, SystemTime)> = inputs
        .iter()
        .filter_map(|p| modified(p).map(|t| (p.clone(), t)))
        .collect();
    evaluate(modified(artifact), modified(binary), &input_times, forced)
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
