// src/orchestrator.rs

use crate::{aggregate, diagnostics};
use crate::error::{RegressError, Result};
use crate::model::{ResultSet, TestCase, TestResult};
use crate::simulator::Simulator;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressDrawTarget};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};

/// Fixed-size worker pool that drives the simulator over many inputs.
pub struct Orchestrator<'a, S: Simulator> {
    simulator: &'a S,
    pool: ThreadPool,
    show_progress: bool,
}

impl<'a, S: Simulator> Orchestrator<'a, S> {
    pub fn new(simulator: &'a S, workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("sim-worker-{i}"))
            .build()
            .map_err(|e| RegressError::Config { details: format!("worker pool: {e}") })?;
        Ok(Self { simulator, pool, show_progress: true })
    }

    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn progress(&self, len: usize, message: &'static str) -> ProgressBar {
        let bar = ProgressBar::new(len as u64);
        if !self.show_progress {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_message(message);
        bar
    }

    /// Replays every case and returns the results sorted by test name,
    /// independent of completion order.
    pub fn run_tests(&self, cases: &[TestCase]) -> ResultSet {
        let bar = self.progress(cases.len(), "Running tests");
        let mut results: ResultSet = self.pool.install(|| {
            cases
                .par_iter()
                .progress_with(bar.clone())
                .map(|case| self.run_one(case))
                .collect()
        });
        bar.finish_with_message("Tests complete");
        aggregate::sort_results(&mut results);
        results
    }

    fn run_one(&self, case: &TestCase) -> TestResult {
        log::debug!("running {} ({})", case.path.display(), case.version);
        match self.simulator.run_dump(&case.path, &case.version) {
            Ok(output) => diagnostics::parse_stream(case, &output.stderr),
            Err(e) => {
                log::warn!("{}: {e}", case.name);
                TestResult::new(case)
            }
        }
    }

    /// Cooks every `(character, version)` pair into `output_dir`.
    pub fn cook_all(&self, characters: &[String], versions: &[u32], output_dir: &Path) -> CookReport {
        let mut pairs: Vec<(&str, u32)> =
            characters.iter().flat_map(|c| versions.iter().map(move |&v| (c.as_str(), v))).collect();
        pairs.sort_unstable();
        let jobs: Vec<(String, PathBuf)> = pairs
            .into_iter()
            .map(|(character, version)| {
                let spec = format!("{character}{version}");
                let out = output_dir.join(format!("{spec}.bin"));
                (spec, out)
            })
            .collect();

        let bar = self.progress(jobs.len(), "Cooking");
        let outcomes: Vec<(String, Result<PathBuf>)> = self.pool.install(|| {
            jobs.par_iter()
                .progress_with(bar.clone())
                .map(|(spec, out)| (spec.clone(), self.simulator.cook(spec, out).map(|()| out.clone())))
                .collect()
        });
        bar.finish_with_message("Cooking complete");

        let mut report = CookReport::default();
        for (spec, outcome) in outcomes {
            match outcome {
                Ok(path) => report.cooked.push(path),
                Err(e) => {
                    log::warn!("{e}");
                    report.failed.push(spec);
                }
            }
        }
        report
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CookReport {
    pub cooked: Vec<PathBuf>,
    pub failed: Vec<String>,
}
