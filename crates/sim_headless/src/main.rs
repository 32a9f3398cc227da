//! Headless simulation runner binary.
//!
//! Runs the deterministic game core without a frontend, controlled from
//! the command line. Reports are JSON on stdout; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in skirmish for 1000 ticks
//! cargo run -p sim_headless -- run
//!
//! # Run a scenario file under custom unit rules
//! cargo run -p sim_headless -- run --scenario battle.ron --rules units.ron
//!
//! # Verify determinism across repeated runs
//! cargo run -p sim_headless -- verify --runs 5 --ticks 500
//!
//! # Measure ticks per second
//! cargo run -p sim_headless -- benchmark --ticks 36000
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sim_core::config::RuleSet;
use sim_headless::runner::{benchmark, default_rules, run_scenario, verify_scenario};
use sim_headless::scenario::Scenario;
use sim_headless::Result;

#[derive(Parser)]
#[command(name = "sim_headless")]
#[command(about = "Headless deterministic simulation runner for CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single scenario and print a JSON report
    Run {
        /// Scenario RON file (built-in skirmish when omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Unit rules RON file (built-in rules when omitted)
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Number of ticks to run
        #[arg(short, long, default_value = "1000")]
        ticks: u64,

        /// State-hash sampling interval in ticks (0 = none)
        #[arg(long, default_value = "100")]
        hash_interval: u64,
    },

    /// Verify determinism by running the same scenario multiple times
    Verify {
        /// Scenario RON file (built-in skirmish when omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Unit rules RON file (built-in rules when omitted)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Number of ticks per run
        #[arg(short, long, default_value = "500")]
        ticks: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// Run N ticks of the built-in skirmish for benchmarking
    Benchmark {
        /// Number of ticks to run
        #[arg(short, long, default_value = "36000")]
        ticks: u64,
    },
}

fn load_scenario(path: Option<&PathBuf>) -> Result<Scenario> {
    match path {
        Some(path) => Scenario::load(path),
        None => Ok(Scenario::skirmish()),
    }
}

fn load_rules(path: Option<&PathBuf>) -> Result<RuleSet> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(RuleSet::from_ron_str(&path.display().to_string(), &text)?)
        }
        None => Ok(default_rules()),
    }
}

fn execute(command: Commands) -> Result<String> {
    match command {
        Commands::Run {
            scenario,
            rules,
            ticks,
            hash_interval,
        } => {
            let scenario = load_scenario(scenario.as_ref())?;
            let rules = load_rules(rules.as_ref())?;
            let report = run_scenario(&scenario, rules, ticks, hash_interval)?;
            Ok(serde_json::to_string_pretty(&report)?)
        }
        Commands::Verify {
            scenario,
            rules,
            ticks,
            runs,
        } => {
            let scenario = load_scenario(scenario.as_ref())?;
            let rules = load_rules(rules.as_ref())?;
            let report = verify_scenario(&scenario, &rules, ticks, runs)?;
            if !report.deterministic {
                tracing::error!("Determinism verification FAILED");
            }
            Ok(serde_json::to_string_pretty(&report)?)
        }
        Commands::Benchmark { ticks } => {
            let report = benchmark(ticks)?;
            Ok(serde_json::to_string_pretty(&report)?)
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Logging goes to stderr; stdout carries the JSON report.
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match execute(cli.command) {
        Ok(report) => println!("{report}"),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}
