mod commands;

use anyhow::Result;
use arbiter_common::config::{DEFAULT_ENGINE_CONFIG, DEFAULT_PROBLEMS_DIR};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Arbiter CLI - Judge submissions and inspect problem sets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Judge a source file against a problem
    Run {
        /// Problem id (e.g., two_sum)
        #[arg(short, long)]
        problem_id: String,

        /// Path to the candidate source file
        #[arg(short, long)]
        source: PathBuf,

        /// Problems directory
        #[arg(long, default_value = DEFAULT_PROBLEMS_DIR)]
        problems_dir: PathBuf,

        /// Engine configuration file
        #[arg(short, long, default_value = DEFAULT_ENGINE_CONFIG)]
        config: PathBuf,

        /// Per-case wall-clock limit, overrides the config file
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Print the evaluation response as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List loaded problems
    List {
        /// Problems directory
        #[arg(long, default_value = DEFAULT_PROBLEMS_DIR)]
        problems_dir: PathBuf,
    },

    /// Check every problem file for empty test sets and duplicate ids
    Validate {
        /// Problems directory
        #[arg(long, default_value = DEFAULT_PROBLEMS_DIR)]
        problems_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let ok = match cli.command {
        Commands::Run {
            problem_id,
            source,
            problems_dir,
            config,
            timeout_ms,
            json,
        } => {
            commands::run_submission(&problem_id, &source, &problems_dir, &config, timeout_ms, json)
                .await?
        }
        Commands::List { problems_dir } => {
            commands::list_problems(&problems_dir)?;
            true
        }
        Commands::Validate { problems_dir } => commands::validate_problems(&problems_dir)?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
