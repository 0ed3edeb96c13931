use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keel_harness::{replay, Campaign, CallStats, HarnessConfig, RunFailure, RunReport, Trace};
use keel_types::U256;
use rand::Rng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "Keel invariant fuzzing campaigns")]
struct Args {
    /// Log level for the harness (error, warn, info, debug, trace).
    #[arg(long, default_value = "warn", global = true)]
    log_level: Level,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run seeded campaigns against the reference protocol.
    Run(RunArgs),
    /// Re-execute a saved trace.
    Replay {
        trace: PathBuf,
    },
    /// Print the default configuration as JSON.
    Config,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// First root seed; runs use seed, seed+1, ... Random when omitted.
    #[arg(long)]
    seed: Option<u64>,
    /// Number of independent campaigns.
    #[arg(long, default_value_t = 1)]
    runs: u64,
    /// Actions per campaign.
    #[arg(long, default_value_t = 1_000)]
    steps: u64,
    /// JSON configuration; defaults apply to missing fields.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Spread independent campaigns across a thread pool.
    #[arg(long)]
    parallel: bool,
    /// Where the first failing trace is written.
    #[arg(long, default_value = "failure.json")]
    out: PathBuf,
}

fn seeds(first: u64, runs: u64) -> Vec<u64> {
    (0..runs).map(|i| first.wrapping_add(i)).collect()
}

fn run_one(config: &HarnessConfig, seed: u64, steps: u64) -> Result<RunReport, RunFailure> {
    let campaign = match Campaign::new(config.clone(), U256::from(seed)) {
        Ok(campaign) => campaign,
        Err(error) => {
            return Err(RunFailure {
                step: 0,
                error,
                trace: Trace::new(U256::from(seed), config.clone()),
            })
        }
    };
    campaign.run(steps)
}

fn run_campaigns(
    config: &HarnessConfig,
    seeds: &[u64],
    steps: u64,
    parallel: bool,
) -> Vec<Result<RunReport, RunFailure>> {
    if parallel {
        seeds
            .par_iter()
            .map(|seed| run_one(config, *seed, steps))
            .collect()
    } else {
        seeds.iter().map(|seed| run_one(config, *seed, steps)).collect()
    }
}

fn print_failure(failure: &RunFailure) {
    println!("=== Campaign failure ===");
    println!("{failure}");
    println!("Last actions:");
    for record in failure.trace.tail(10) {
        println!("  {record}");
    }
}

fn cmd_run(args: &RunArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    let first = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let seeds = seeds(first, args.runs);
    info!("running {} campaigns of {} steps from seed {}", seeds.len(), args.steps, first);

    let start = Instant::now();
    let results = run_campaigns(&config, &seeds, args.steps, args.parallel);
    let elapsed = start.elapsed();

    let mut stats = CallStats::default();
    let mut passed = 0u64;
    let mut first_failure = None;
    let mut failed = 0u64;
    for result in results {
        match result {
            Ok(report) => {
                passed += 1;
                stats.merge(&report.stats);
                if args.runs == 1 {
                    println!("{report}");
                }
            }
            Err(failure) => {
                failed += 1;
                error!("{failure}");
                first_failure.get_or_insert(failure);
            }
        }
    }

    println!("=== Keel campaign summary ===");
    println!("Root seeds: {}..={}", first, first.wrapping_add(args.runs.saturating_sub(1)));
    println!("Steps per run: {}", args.steps);
    println!("Passed: {passed}");
    println!("Failed: {failed}");
    println!("Elapsed: {elapsed:.2?}");
    if args.runs > 1 {
        print!("{stats}");
    }

    if let Some(failure) = first_failure {
        print_failure(&failure);
        save_trace(&failure.trace, &args.out)?;
        println!("Trace written to {}", args.out.display());
        bail!("{failed} of {} campaigns failed", args.runs);
    }
    Ok(())
}

fn save_trace(trace: &Trace, path: &Path) -> Result<()> {
    trace
        .save(path)
        .with_context(|| format!("writing trace {}", path.display()))
}

fn cmd_replay(path: &Path) -> Result<()> {
    let trace = Trace::load(path).with_context(|| format!("loading trace {}", path.display()))?;
    println!(
        "Replaying {} actions from seed 0x{:x}",
        trace.actions.len(),
        trace.root_seed
    );
    match (replay(&trace), &trace.failure) {
        (Ok(report), None) => {
            println!("{report}");
            Ok(())
        }
        (Ok(report), Some(note)) => {
            println!("{report}");
            bail!("recorded failure at step {} did not reproduce: {}", note.step, note.error)
        }
        (Err(failure), recorded) => {
            print_failure(&failure);
            let reproduced = recorded
                .as_ref()
                .is_some_and(|note| note.step == failure.step && note.error == failure.error.to_string());
            if reproduced {
                println!("Recorded failure reproduced.");
            }
            bail!("replay failed at step {}", failure.step)
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    match &args.command {
        Command::Run(run) => cmd_run(run),
        Command::Replay { trace } => cmd_replay(trace),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&HarnessConfig::default())?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_arguments_parse() {
        let args = Args::try_parse_from([
            "keel-sim", "--log-level", "debug", "run", "--seed", "7", "--runs", "3", "--parallel",
        ])
        .unwrap();
        assert_eq!(args.log_level, Level::DEBUG);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.seed, Some(7));
                assert_eq!(run.runs, 3);
                assert_eq!(run.steps, 1_000);
                assert!(run.parallel);
                assert_eq!(run.out, PathBuf::from("failure.json"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn seeds_are_consecutive() {
        assert_eq!(seeds(5, 3), vec![5, 6, 7]);
        assert_eq!(seeds(u64::MAX, 2), vec![u64::MAX, 0]);
    }

    #[test]
    fn parallel_and_serial_runs_agree() {
        let config = HarnessConfig::default();
        let seeds = seeds(40, 4);
        let serial = run_campaigns(&config, &seeds, 60, false);
        let parallel = run_campaigns(&config, &seeds, 60, true);
        for (a, b) in serial.iter().zip(&parallel) {
            assert_eq!(a.as_ref().unwrap(), b.as_ref().unwrap());
        }
    }

    #[test]
    fn invalid_config_becomes_a_failure() {
        let config = HarnessConfig {
            positions: 0,
            ..HarnessConfig::default()
        };
        let results = run_campaigns(&config, &[1], 10, false);
        assert!(results[0].is_err());
    }
}
