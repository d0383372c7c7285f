// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Regression runs and error trends for simulator replays", long_about = None)]
pub struct Args {
    /// Repository root; all configured paths are relative to it
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file (defaults to sim-regress.toml under the root, if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay every dump and write the new results
    Run {
        /// Rerun even if the previous results are newer than every input
        #[arg(short, long)]
        force: bool,

        /// Worker threads (defaults to the configured value, then hardware parallelism)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Kill a replay that runs longer than this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Promote the new results to the accepted baseline
    Accept,
    /// Update the commit-indexed error history
    History,
    /// Compare character data between two dataset versions
    Diff {
        /// Version to compare from
        #[arg(long)]
        old: u32,

        /// Version to compare to
        #[arg(long)]
        new: u32,

        /// Characters to compare (defaults to every character in the data directory)
        #[arg(long = "char", value_name = "NAME")]
        characters: Vec<String>,
    },
    /// Cook every character for every supported version
    Cook {
        /// Directory to write cooked files to
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Print the dataset versions the simulator supports
    Versions,
}
