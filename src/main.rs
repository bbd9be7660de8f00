use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use funcbox::Config;

mod commands;

#[derive(Parser)]
#[command(name = "funcbox")]
#[command(
    author,
    version,
    about = "Run untrusted code snippets in disposable Docker sandboxes"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ./funcbox.toml, then the user config directory)
    #[arg(long, global = true, env = "FUNCBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Also write JSON logs to this directory, rotated daily
    #[arg(long, global = true, env = "FUNCBOX_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a snippet in a sandbox
    Run {
        /// Language of the snippet (e.g. python, javascript)
        #[arg(short, long)]
        language: String,

        /// Source code to run
        #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
        code: Option<String>,

        /// Read source code from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Timeout in seconds (default: from funcbox.toml)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Name used in logs and metrics
        #[arg(short, long)]
        name: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build missing sandbox images ahead of time
    Warm {
        /// Language to warm (repeatable; default: all)
        #[arg(short, long)]
        language: Vec<String>,
    },

    /// Check Docker connectivity and image status
    Doctor,

    /// List registered languages
    Languages,
}

/// Console logs go to stderr so `run --json` output stays parseable.
fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = if verbose {
        EnvFilter::new("funcbox=debug")
    } else {
        EnvFilter::new("funcbox=info")
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "funcbox.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().json().with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_dir.as_deref());

    let config = Config::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            language,
            code,
            file,
            timeout,
            name,
            json,
        } => {
            let args = commands::run::RunArgs {
                language,
                code,
                file,
                timeout,
                name,
                json,
            };
            if !commands::run::run(&config, args).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Warm { language } => {
            commands::warm::run(&config, &language).await?;
        }
        Commands::Doctor => {
            commands::doctor::run(&config).await?;
        }
        Commands::Languages => {
            commands::languages::run(&config)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
