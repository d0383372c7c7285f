// src/simulator.rs
//
// The simulator is an external binary. Everything the crate needs from it goes
// through `Simulator` so orchestration can be exercised without a real build.

use crate::error::{RegressError, Result};
use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const WAIT_POLL: Duration = Duration::from_millis(20);

/// Captured output of one simulator invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

pub trait Simulator: Sync {
    /// `<binary> run_dump <dump> <version>`; diagnostics arrive on stderr.
    fn run_dump(&self, dump: &Path, version: &str) -> Result<RunOutput>;

    /// `<binary> cook <spec> <output>`; fails unless `output` exists afterwards.
    fn cook(&self, spec: &str, output: &Path) -> Result<()>;

    /// `<binary> printversions`
    fn print_versions(&self) -> Result<Vec<u32>>;
}

#[derive(Debug, Clone)]
pub struct ProcessSimulator {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessSimulator {
    pub fn new(binary: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self { binary: binary.into(), timeout }
    }

    fn invoke<I, S>(&self, args: I) -> Result<RunOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RegressError::Launch { binary: self.binary.clone(), source })?;

        // Drain both pipes while waiting so a chatty child cannot block on a full pipe.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match self.timeout {
            Some(limit) => wait_with_deadline(&mut child, limit),
            None => child.wait().map(Some),
        }
        .map_err(|e| RegressError::io(&self.binary, e))?;

        // A killed child's own children may still hold the pipes, so the
        // drain threads are left detached rather than joined.
        if let (None, Some(timeout)) = (status, self.timeout) {
            return Err(RegressError::Timeout { binary: self.binary.clone(), timeout });
        }
        Ok(RunOutput {
            stdout: collect(stdout),
            stderr: collect(stderr),
            exit_code: status.and_then(|s| s.code()),
        })
    }
}

impl Simulator for ProcessSimulator {
    fn run_dump(&self, dump: &Path, version: &str) -> Result<RunOutput> {
        self.invoke([OsStr::new("run_dump"), dump.as_os_str(), OsStr::new(version)])
    }

    fn cook(&self, spec: &str, output: &Path) -> Result<()> {
        let run = self.invoke([OsStr::new("cook"), OsStr::new(spec), output.as_os_str()])?;
        if run.exit_code != Some(0) {
            return Err(RegressError::Cook {
                spec: spec.to_string(),
                details: format!("exit code {:?}: {}", run.exit_code, run.stderr.trim()),
            });
        }
        if !output.is_file() {
            return Err(RegressError::Cook { spec: spec.to_string(), details: "no output written".into() });
        }
        Ok(())
    }

    fn print_versions(&self) -> Result<Vec<u32>> {
        let run = self.invoke(["printversions"])?;
        Ok(parse_versions(&run.stdout))
    }
}

pub fn parse_versions(stdout: &str) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let parsed = line.parse().ok();
            if parsed.is_none() {
                log::warn!("ignoring unparsable version line {line:?}");
            }
            parsed
        })
        .collect()
}

/// Waits for `child` up to `limit`, killing it when the limit elapses.
/// `Ok(None)` means the child was killed.
fn wait_with_deadline(child: &mut Child, limit: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(WAIT_POLL);
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
