//! Spindle command line interface
//!
//! Runs retriable-transaction scenarios against an in-memory database and reports how
//! aborts were retried.

mod commands;
mod error;
mod output;
mod scenario;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::{policy, simulate};
use crate::error::Result;

/// Spindle command line interface
#[derive(Parser, Debug)]
#[command(name = "spindle")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario file against the in-memory database
    Simulate {
        /// Path to the scenario file
        file: PathBuf,

        /// Override the maximum number of internal retries
        #[arg(long, env = "SPINDLE_MAX_RETRIES")]
        max_retries: Option<u32>,

        /// Surface aborts instead of retrying them
        #[arg(long)]
        disable_retries: bool,
    },

    /// Print the default retry policy
    Policy,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("spindle=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Simulate { file, max_retries, disable_retries } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(simulate::run(&file, max_retries, disable_retries, cli.format))
        }
        Commands::Policy => policy::run(cli.format),
    }
}
