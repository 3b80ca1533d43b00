use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pinion_core::{Project, ProjectConfig};
use tracing_subscriber::EnvFilter;

mod commands;

/// Pinion - a task runner with pinned, verified tools
#[derive(Parser)]
#[command(name = "pinion")]
#[command(about = "Run project tasks with pinned, verified tools")]
#[command(version)]
struct Cli {
    /// Path to pinion.toml (defaults to searching upward from the current directory)
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task after its dependencies
    Run {
        /// Task name
        task: String,
        /// Arguments appended to the task's command
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Run the dev task under the file watcher
    Dev {
        /// Milliseconds to wait after SIGTERM before killing the watcher
        #[arg(long, default_value_t = 2000)]
        grace_ms: u64,
        /// Disable Ctrl-R / Ctrl-C hotkeys
        #[arg(long)]
        no_hotkeys: bool,
        /// Arguments appended to the dev command
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Verify installed tools against the lockfile
    Check {
        /// Print a JSON summary instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Resolve, install and lock all declared tools
    Sync {
        /// Maximum concurrent resolutions and installs
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// List declared tasks
    List,
    /// Show the task dependency graph, or the execution order of one task
    Graph {
        task: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("PINION_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let project = Project::load(&ProjectConfig {
        manifest_path: cli.manifest,
        start_dir: std::env::current_dir().context("Failed to read current directory")?,
    })
    .context("Failed to load project")?;

    // Execute command (CLI layer only handles presentation)
    match cli.command {
        Commands::Run { task, args } => commands::run::execute(&project, &task, &args).await,
        Commands::Dev {
            grace_ms,
            no_hotkeys,
            args,
        } => {
            let config = pinion_core::dev::SupervisorConfig {
                grace_period: Duration::from_millis(grace_ms),
                hotkeys: !no_hotkeys,
            };
            commands::dev::execute(&project, &args, &config).await
        }
        Commands::Check { json } => commands::check::execute(&project, json),
        Commands::Sync { jobs } => commands::sync::execute(&project, jobs).await,
        Commands::List => commands::list::execute(&project),
        Commands::Graph { task } => commands::graph::execute(&project, task.as_deref()),
    }
}
