// src/lib.rs
//
// Regression runs of recorded simulator dumps, commit-indexed error trends and
// dataset diffs.

pub mod aggregate;
pub mod app;
pub mod artifact;
pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod history;
pub mod model;
pub mod orchestrator;
pub mod simulator;
pub mod staleness;
pub mod vcs;

pub use error::{RegressError, Result};
