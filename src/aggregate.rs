// src/aggregate.rs

use crate::model::{ErrorCode, ResultSet, Stats, TestResult};
use serde::de::IgnoredAny;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

/// Supplies the recorded dump for a test so its frame length can be counted.
pub trait FrameSource {
    fn dump_content(&self, version: &str, name: &str) -> Option<String>;
}

/// Reads dumps from a `<root>/<version>/<name>.json` tree on disk.
pub struct DumpDir {
    root: PathBuf,
}

impl DumpDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FrameSource for DumpDir {
    fn dump_content(&self, version: &str, name: &str) -> Option<String> {
        fs::read_to_string(self.root.join(version).join(format!("{name}.json"))).ok()
    }
}

pub fn sort_results(results: &mut ResultSet) {
    results.sort_by(|a, b| a.test_name.cmp(&b.test_name));
}

pub fn error_count(results: &[TestResult], ignored: &BTreeSet<ErrorCode>) -> u64 {
    results
        .iter()
        .flat_map(|r| r.error_types.iter().enumerate())
        .filter(|(code, _)| !ignored.contains(code))
        .map(|(_, bucket)| bucket.count)
        .sum()
}

/// Number of frames in a dump, which is a JSON array with one element per frame.
pub fn dump_frames(content: &str) -> Option<u64> {
    serde_json::from_str::<Vec<IgnoredAny>>(content).ok().map(|frames| frames.len() as u64)
}

pub fn frame_count(results: &[TestResult], frames: &dyn FrameSource) -> u64 {
    results
        .iter()
        .filter_map(|r| {
            let content = frames.dump_content(&r.test_version, &r.test_name)?;
            let count = dump_frames(&content);
            if count.is_none() {
                log::debug!("unparsable dump {}/{}", r.test_version, r.test_name);
            }
            count
        })
        .sum()
}

pub fn compute_stats(results: &[TestResult], ignored: &BTreeSet<ErrorCode>, frames: &dyn FrameSource) -> Stats {
    Stats { error_count: error_count(results, ignored), frame_count: frame_count(results, frames) }
}

/// Difference of one test between the accepted baseline and a new run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultChange {
    Added { test: String },
    Removed { test: String },
    Finished { test: String, now: bool },
    ErrorCount { test: String, code: ErrorCode, old: u64, new: u64 },
}

impl std::fmt::Display for ResultChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultChange::Added { test } => write!(f, "{test}: new test"),
            ResultChange::Removed { test } => write!(f, "{test}: no longer run"),
            ResultChange::Finished { test, now: true } => write!(f, "{test}: now finishes"),
            ResultChange::Finished { test, now: false } => write!(f, "{test}: no longer finishes"),
            ResultChange::ErrorCount { test, code, old, new } => {
                write!(f, "{test}: error type {code} went from {old} to {new}")
            }
        }
    }
}

impl ResultChange {
    pub fn is_regression(&self) -> bool {
        match self {
            ResultChange::Finished { now, .. } => !now,
            ResultChange::ErrorCount { old, new, .. } => new > old,
            ResultChange::Removed { .. } => true,
            ResultChange::Added { .. } => false,
        }
    }
}

pub fn compare_results(
    baseline: &[TestResult],
    new: &[TestResult],
    ignored: &BTreeSet<ErrorCode>,
) -> Vec<ResultChange> {
    let old_by_name: BTreeMap<&str, &TestResult> = baseline.iter().map(|r| (r.test_name.as_str(), r)).collect();
    let new_by_name: BTreeMap<&str, &TestResult> = new.iter().map(|r| (r.test_name.as_str(), r)).collect();
    let names: BTreeSet<&str> = old_by_name.keys().chain(new_by_name.keys()).copied().collect();

    let mut changes = Vec::new();
    for name in names {
        let test = name.to_string();
        let (old, new) = match (old_by_name.get(name), new_by_name.get(name)) {
            (Some(old), Some(new)) => (*old, *new),
            (None, Some(_)) => {
                changes.push(ResultChange::Added { test });
                continue;
            }
            (Some(_), None) => {
                changes.push(ResultChange::Removed { test });
                continue;
            }
            (None, None) => continue,
        };
        if old.finished != new.finished {
            changes.push(ResultChange::Finished { test: test.clone(), now: new.finished });
        }
        let codes = old.error_types.len().max(new.error_types.len());
        for code in (0..codes).filter(|c| !ignored.contains(c)) {
            let (before, after) = (old.count_for(code), new.count_for(code));
            if before != after {
                changes.push(ResultChange::ErrorCount { test: test.clone(), code, old: before, new: after });
            }
        }
    }
    changes
}
