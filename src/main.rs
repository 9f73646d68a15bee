//! CLI entry point for the manual archiver.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use manual_archiver_core::{Catalog, Config, Database};
use tracing::{debug, info};

mod app;
mod cli;
mod commands;

use app::terminal;
use cli::{Cli, Command};

/// How the process ended, mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    /// Some items failed; re-running resumes them.
    Partial,
    Failure,
}

impl ProcessExit {
    fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    let no_color = terminal::no_color_env_requested() || terminal::is_dumb_terminal();
    terminal::init_tracing(terminal::default_log_level(cli.quiet, cli.verbose), no_color);
    debug!(?cli, "CLI arguments parsed");

    match run(&cli).await {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::from(ProcessExit::Failure.code())
        }
    }
}

async fn run(cli: &Cli) -> Result<ProcessExit> {
    let loaded = Config::load(cli.config.as_deref())?;
    let mut config = loaded.config;
    match &loaded.path {
        Some(path) => info!(path = %path.display(), "loaded config"),
        None => debug!("no config file; using defaults"),
    }
    if let Some(db) = &cli.db {
        config.database_path.clone_from(db);
    }

    if let Some(parent) = config.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = Database::new(&config.database_path).await?;
    let catalog = Catalog::new(db);

    match &cli.command {
        Command::Scrape(args) => {
            commands::run_scrape_command(args, &config, &catalog, cli.quiet).await
        }
        Command::CheckArchive(args) => {
            commands::run_check_archive_command(args, &config, &catalog).await
        }
        Command::Upload(args) => commands::run_upload_command(args, &config, &catalog).await,
        Command::VerifyArchive(args) => {
            commands::run_verify_archive_command(args, &config, &catalog).await
        }
        Command::Status(args) => {
            commands::run_status_command(args, &catalog).await?;
            Ok(ProcessExit::Success)
        }
        Command::Clear(args) => {
            commands::run_clear_command(args, &catalog).await?;
            Ok(ProcessExit::Success)
        }
    }
}
