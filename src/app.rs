// src/app.rs
//
// One method per command, tying the pieces to the configured repository layout.

use crate::aggregate::{self, DumpDir, ResultChange};
use crate::artifact::{self, BASELINE_RESULTS_VAR, NEW_RESULTS_VAR, PENDING_VAR};
use crate::config::Config;
use crate::diff::{CharacterData, DiffEngine, Finding};
use crate::discovery;
use crate::error::{RegressError, Result};
use crate::history::{self, HistoryStore, UpdateOutcome};
use crate::model::{ResultSet, Stats};
use crate::orchestrator::{CookReport, Orchestrator};
use crate::simulator::{ProcessSimulator, Simulator};
use crate::staleness::{self, StaleReason, Staleness};
use crate::vcs::VersionControl;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub force: bool,
    pub workers: usize,
    pub show_progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    NoTests,
    UpToDate,
    Ran(RunSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: StaleReason,
    pub tests: usize,
    pub unfinished: Vec<String>,
    pub stats: Stats,
    /// Differences against the accepted baseline, empty when there is none
    pub changes: Vec<ResultChange>,
}

pub struct Workspace {
    root: PathBuf,
    config: Config,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self { root: root.into(), config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// The simulator binary: relative paths resolve against the root when such
    /// a file exists there, otherwise they are left for `PATH` lookup.
    pub fn simulator_path(&self) -> PathBuf {
        let configured = &self.config.paths.simulator;
        let local = self.root.join(configured);
        if configured.is_relative() && local.is_file() { local } else { configured.clone() }
    }

    pub fn process_simulator(&self, timeout_secs: Option<u64>) -> ProcessSimulator {
        let timeout = timeout_secs.map(std::time::Duration::from_secs).or_else(|| self.config.run.timeout());
        ProcessSimulator::new(self.simulator_path(), timeout)
    }

    fn dumps(&self) -> DumpDir {
        DumpDir::new(self.path(&self.config.paths.dumps_dir))
    }

    pub fn stats(&self, results: &ResultSet) -> Stats {
        aggregate::compute_stats(results, &self.config.run.ignored_error_types, &self.dumps())
    }

    pub fn run<S: Simulator>(&self, simulator: &S, options: RunOptions) -> Result<RunOutcome> {
        let paths = &self.config.paths;
        let cases = discovery::discover_tests(&self.path(&paths.dumps_dir))?;
        if cases.is_empty() {
            return Ok(RunOutcome::NoTests);
        }

        let new_results = self.path(&paths.new_results);
        let reason = match staleness::check(
            &new_results,
            &self.simulator_path(),
            &discovery::input_paths(&cases),
            options.force,
        ) {
            Staleness::Fresh => return Ok(RunOutcome::UpToDate),
            Staleness::Stale(reason) => reason,
        };
        log::info!("running {} tests ({reason})", cases.len());

        let workers = if options.workers > 0 { options.workers } else { self.config.run.worker_count() };
        let mut orchestrator = Orchestrator::new(simulator, workers)?;
        if !options.show_progress {
            orchestrator = orchestrator.quiet();
        }
        let results = orchestrator.run_tests(&cases);
        artifact::save(&new_results, NEW_RESULTS_VAR, &results)?;

        let changes = match artifact::load_results(&self.path(&paths.baseline_results)) {
            Ok(Some(baseline)) => {
                aggregate::compare_results(&baseline, &results, &self.config.run.ignored_error_types)
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("cannot compare against baseline: {e}");
                Vec::new()
            }
        };

        Ok(RunOutcome::Ran(RunSummary {
            reason,
            tests: results.len(),
            unfinished: results.iter().filter(|r| !r.finished).map(|r| r.test_name.clone()).collect(),
            stats: self.stats(&results),
            changes,
        }))
    }

    /// Copies the new results over the baseline and records a pending history point.
    pub fn accept(&self, date: String) -> Result<Stats> {
        let paths = &self.config.paths;
        let source = self.path(&paths.new_results);
        let results = artifact::load_results(&source)?.ok_or_else(|| RegressError::Artifact {
            context: source.display().to_string(),
            details: "no new results; run the tests first".into(),
        })?;
        artifact::save(&self.path(&paths.baseline_results), BASELINE_RESULTS_VAR, &results)?;

        let stats = self.stats(&results);
        artifact::save(&self.path(&paths.pending), PENDING_VAR, &history::pending_entry(stats, date))?;
        Ok(stats)
    }

    pub fn update_history<V: VersionControl>(&self, vcs: &V) -> Result<UpdateOutcome> {
        let paths = &self.config.paths;
        let history_path = self.path(&paths.history);
        let mut trend = artifact::load_history(&history_path)?.unwrap_or_default();
        let store = HistoryStore::new(vcs, &paths.baseline_results, &paths.dumps_dir, &self.config.run.ignored_error_types);
        let outcome = store.update(&mut trend)?;
        if outcome.rebuilt || outcome.changed() {
            artifact::save_history(&history_path, &trend)?;
        }
        Ok(outcome)
    }

    /// Diffs each character between two versions. Characters whose data cannot
    /// be loaded are skipped.
    pub fn diff(&self, characters: &[String], old: u32, new: u32) -> Result<Vec<(String, Vec<Finding>)>> {
        let data_dir = self.path(&self.config.paths.data_dir);
        let characters = if characters.is_empty() {
            discovery::discover_characters(&data_dir)?
        } else {
            characters.to_vec()
        };
        let engine = DiffEngine::new(&self.config.diff);

        let mut report = Vec::new();
        for name in characters {
            let loaded = CharacterData::load(&data_dir, &name, old)
                .and_then(|before| Ok((before, CharacterData::load(&data_dir, &name, new)?)));
            match loaded {
                Ok((before, after)) => {
                    let findings = engine.diff(&before, &after);
                    report.push((name, findings));
                }
                Err(e) => log::warn!("skipping {name}: {e}"),
            }
        }
        Ok(report)
    }

    pub fn cook<S: Simulator>(&self, simulator: &S, output: &Path, options: RunOptions) -> Result<CookReport> {
        let versions = simulator.print_versions()?;
        let characters = discovery::discover_characters(&self.path(&self.config.paths.data_dir))?;
        if versions.is_empty() || characters.is_empty() {
            return Ok(CookReport::default());
        }
        fs::create_dir_all(output).map_err(|e| RegressError::io(output, e))?;

        let workers = if options.workers > 0 { options.workers } else { self.config.run.worker_count() };
        let mut orchestrator = Orchestrator::new(simulator, workers)?;
        if !options.show_progress {
            orchestrator = orchestrator.quiet();
        }
        log::info!("cooking {} files on {} threads", characters.len() * versions.len(), orchestrator.workers());
        Ok(orchestrator.cook_all(&characters, &versions, output))
    }
}
