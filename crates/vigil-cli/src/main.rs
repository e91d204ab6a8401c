//! Developer harness for the Vigil creature AI.

mod commands;
mod scenario;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Vigil: run creature AI scenarios through the region scheduler",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print the state of every body
    Simulate {
        /// Scenario JSON file (default: built-in demo)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Server configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Virtual milliseconds to run
        #[arg(short, long, default_value = "20000")]
        duration: u64,

        /// RNG seed for deterministic runs
        #[arg(long)]
        seed: Option<u64>,

        /// Print the full event log
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the default server configuration as JSON
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Simulate {
            scenario,
            config,
            duration,
            seed,
            verbose,
        } => commands::simulate::run(scenario.as_deref(), config.as_deref(), duration, seed, verbose),
        Commands::Config => commands::config::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
