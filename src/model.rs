// src/model.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Integer error-type code reported by the simulator
pub type ErrorCode = usize;

/// A single dump to replay, discovered on disk
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TestCase {
    pub name: String,
    pub path: PathBuf,
    /// Dataset revision the dump was recorded against (its parent directory)
    pub version: String,
}

/// Occurrence statistics for one error code within one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTypeBucket {
    pub count: u64,
    pub first_frame: i64,
    pub last_frame: i64,
}

impl Default for ErrorTypeBucket {
    fn default() -> Self {
        Self { count: 0, first_frame: -1, last_frame: -1 }
    }
}

impl ErrorTypeBucket {
    pub fn record(&mut self, frame: i64) {
        if self.count == 0 {
            self.first_frame = frame;
        }
        self.last_frame = frame;
        self.count += 1;
    }
}

/// Outcome of replaying one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_name: String,
    pub test_version: String,
    pub finished: bool,
    /// Dense, indexed by error code
    #[serde(default)]
    pub error_types: Vec<ErrorTypeBucket>,
}

impl TestResult {
    pub fn new(case: &TestCase) -> Self {
        Self {
            test_name: case.name.clone(),
            test_version: case.version.clone(),
            finished: false,
            error_types: Vec::new(),
        }
    }

    /// Records one error occurrence, growing the bucket list so `code` is addressable.
    pub fn record_error(&mut self, code: ErrorCode, frame: i64) {
        if self.error_types.len() <= code {
            self.error_types.resize(code + 1, ErrorTypeBucket::default());
        }
        self.error_types[code].record(frame);
    }

    pub fn count_for(&self, code: ErrorCode) -> u64 {
        self.error_types.get(code).map_or(0, |b| b.count)
    }
}

/// Results of a whole run, sorted by test name
pub type ResultSet = Vec<TestResult>;

/// One point of the error trend, tied to the commit that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "hash")]
    pub short_hash: String,
    pub full_hash: String,
    pub message: String,
    pub date: String,
    pub error_count: u64,
    pub frame_count: u64,
    pub error_percent: f64,
}

impl HistoryEntry {
    pub fn new(commit: &CommitInfo, stats: Stats) -> Self {
        Self {
            short_hash: commit.full_hash.chars().take(8).collect(),
            full_hash: commit.full_hash.clone(),
            message: commit.message.clone(),
            date: commit.date.clone(),
            error_count: stats.error_count,
            frame_count: stats.frame_count,
            error_percent: stats.error_percent(),
        }
    }

    pub fn stats(&self) -> Stats {
        Stats { error_count: self.error_count, frame_count: self.frame_count }
    }
}

/// Trend log, oldest entry first
pub type HistoryLog = Vec<HistoryEntry>;

/// The statistic persisted per commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub error_count: u64,
    pub frame_count: u64,
}

impl Stats {
    /// Percentage of frames with a counted error, rounded to 4 decimals.
    pub fn error_percent(&self) -> f64 {
        if self.frame_count == 0 {
            return 0.0;
        }
        let pct = 100.0 * self.error_count as f64 / self.frame_count as f64;
        (pct * 10_000.0).round() / 10_000.0
    }
}

/// A commit as reported by the version-control backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub full_hash: String,
    /// Subject line only
    pub message: String,
    /// Author date, `YYYY-MM-DD HH:MM:SS +ZZZZ`
    pub date: String,
}
