// src/main.rs

mod cli;

use chrono::Local;
use clap::Parser;
use cli::{Args, Command};
use sim_regress::app::{RunOptions, RunOutcome, Workspace};
use sim_regress::config::Config;
use sim_regress::simulator::Simulator;
use sim_regress::vcs::GitRepo;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let start_time = Instant::now();

    let outcome = Config::load(&args.root, args.config.as_deref())
        .map(|config| Workspace::new(&args.root, config))
        .and_then(|workspace| execute(&workspace, args.command));

    match outcome {
        Ok(()) => {
            log::debug!("finished in {:.2?}", start_time.elapsed());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn execute(workspace: &Workspace, command: Command) -> sim_regress::Result<()> {
    match command {
        Command::Run { force, jobs, timeout_secs } => {
            let simulator = workspace.process_simulator(timeout_secs);
            let options = RunOptions { force, workers: jobs.unwrap_or(0), show_progress: true };
            match workspace.run(&simulator, options)? {
                RunOutcome::NoTests => println!("No tests found."),
                RunOutcome::UpToDate => println!("Results are up to date, use --force to rerun."),
                RunOutcome::Ran(summary) => {
                    println!(
                        "Ran {} tests: {} errors over {} frames ({}%).",
                        summary.tests,
                        summary.stats.error_count,
                        summary.stats.frame_count,
                        summary.stats.error_percent()
                    );
                    for name in &summary.unfinished {
                        println!("  unfinished: {name}");
                    }
                    for change in &summary.changes {
                        let marker = if change.is_regression() { "-" } else { "+" };
                        println!("  {marker} {change}");
                    }
                }
            }
        }
        Command::Accept => {
            let date = Local::now().format("%Y-%m-%d %H:%M:%S %z").to_string();
            let stats = workspace.accept(date)?;
            println!(
                "Accepted new baseline: {} errors over {} frames ({}%).",
                stats.error_count,
                stats.frame_count,
                stats.error_percent()
            );
        }
        Command::History => {
            let repo = GitRepo::open(&workspace.path(""), workspace.config().history.upstream.clone())?;
            let outcome = workspace.update_history(&repo)?;
            if outcome.rebuilt {
                println!("Rebuilt history with {} entries.", outcome.appended.len());
            } else if outcome.changed() {
                println!("Dropped {} entries, added {}.", outcome.truncated, outcome.appended.len());
            } else {
                println!("History is up to date.");
            }
        }
        Command::Diff { old, new, characters } => {
            for (character, findings) in workspace.diff(&characters, old, new)? {
                for finding in findings {
                    println!("{character} {finding}");
                }
            }
        }
        Command::Cook { output, jobs } => {
            let simulator = workspace.process_simulator(None);
            let options = RunOptions { force: false, workers: jobs.unwrap_or(0), show_progress: true };
            let report = workspace.cook(&simulator, &output, options)?;
            println!("Cooked {} files.", report.cooked.len());
            for spec in &report.failed {
                println!("  failed: {spec}");
            }
        }
        Command::Versions => {
            let simulator = workspace.process_simulator(None);
            for version in simulator.print_versions()? {
                println!("{version}");
            }
        }
    }
    Ok(())
}
