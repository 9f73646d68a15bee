//! Scrape command handler: enumerate listings, then download pending items.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use manual_archiver_core::archive::ArchiveCredentials;
use manual_archiver_core::catalog::PendingFilter;
use manual_archiver_core::config::ProxyConfig;
use manual_archiver_core::download::{
    CaptchaSolver, ClientOptions, FallbackSolver, OperatorSolver, TwoCaptchaSolver,
};
use manual_archiver_core::{
    AdapterRegistry, ArchiveClient, BlobStore, Catalog, Config, DownloadEngine, EngineError,
    Enumerator, HostBlocklist, HttpClient, ScrapeOptions, SiteAdapter,
};
use tracing::{info, warn};

use crate::ProcessExit;
use crate::app::{exit_handler, progress_manager, terminal};
use crate::cli::ScrapeArgs;

pub async fn run_scrape_command(
    args: &ScrapeArgs,
    config: &Config,
    catalog: &Catalog,
    quiet: bool,
) -> Result<ProcessExit> {
    if args.clear_all {
        let (items, collections) = catalog.clear_everything().await?;
        println!("Cleared {items} items and {collections} collections.");
    } else if args.clear {
        let items = catalog.clear_items(Some(args.source)).await?;
        let collections = catalog.clear_collections(Some(args.source)).await?;
        println!(
            "Cleared {items} items and {collections} collections for {}.",
            args.source.display_name()
        );
    }

    let blocklist = match &config.adblock_list_path {
        Some(path) => HostBlocklist::with_list_file(path)?,
        None => HostBlocklist::builtin(),
    };
    let registry = AdapterRegistry::from_config(config, Arc::new(blocklist))?;
    let adapter = registry.get(args.source)?;

    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        quiet,
        terminal::is_dumb_terminal(),
    );
    let (progress_handle, progress_stop) =
        progress_manager::spawn_progress_ui(use_spinner, catalog.clone(), args.source);

    let outcome = run_phases(args, config, catalog, adapter.as_ref()).await;
    progress_manager::stop_progress_ui(progress_handle, &progress_stop).await;
    outcome
}

async fn run_phases(
    args: &ScrapeArgs,
    config: &Config,
    catalog: &Catalog,
    adapter: &dyn SiteAdapter,
) -> Result<ProcessExit> {
    let mut exit = ProcessExit::Success;

    if !args.download_only {
        let options = ScrapeOptions {
            discover: args.discover,
            collections: args.collections.clone(),
        };
        let summary = Enumerator::new(catalog.clone())
            .with_page_delay(config.item_delay())
            .run(adapter, &options)
            .await?;
        println!(
            "Scraped {} collections ({} pages, {} items); {} interrupted.",
            summary.collections, summary.pages, summary.items_upserted, summary.failed_collections
        );
        exit = exit_handler::determine_exit_outcome(
            summary.collections - summary.failed_collections,
            summary.failed_collections,
        );
    }

    if args.scrape_only {
        return Ok(exit);
    }

    let engine = build_engine(config, catalog, !args.no_archive_check).await?;
    let filter = PendingFilter {
        brand: args.brand.clone(),
        category: args.category.clone(),
        limit: args.limit,
    };
    match engine.run(adapter, &filter).await {
        Ok(summary) => {
            println!("Download run: {summary}.");
            Ok(worst(
                exit,
                exit_handler::determine_exit_outcome(summary.succeeded, summary.failed),
            ))
        }
        Err(EngineError::CircuitOpen { failures, summary }) => {
            eprintln!(
                "Stopped after {failures} consecutive failures ({summary}). \
                 The site may be blocking requests; re-run later to resume."
            );
            Ok(ProcessExit::Failure)
        }
        Err(other) => Err(other.into()),
    }
}

fn worst(a: ProcessExit, b: ProcessExit) -> ProcessExit {
    match (a, b) {
        (ProcessExit::Failure, _) | (_, ProcessExit::Failure) => ProcessExit::Failure,
        (ProcessExit::Partial, _) | (_, ProcessExit::Partial) => ProcessExit::Partial,
        _ => ProcessExit::Success,
    }
}

async fn build_engine(
    config: &Config,
    catalog: &Catalog,
    archive_precheck: bool,
) -> Result<DownloadEngine> {
    let blobs = BlobStore::new(&config.download_dir);
    let transfer_proxy = config.transfer_proxy().map(ProxyConfig::url).transpose()?;
    let transfer = HttpClient::new(&ClientOptions::default().with_proxy(transfer_proxy))
        .context("failed to build transfer HTTP client")?;

    let mut engine = DownloadEngine::new(catalog.clone(), blobs, transfer, build_solver(config).await?)
        .with_item_delay(config.item_delay());
    if archive_precheck {
        let client = ArchiveClient::new(ArchiveCredentials::from_config(&config.archive))?;
        engine = engine.with_archive_precheck(client);
    }
    Ok(engine)
}

/// 2captcha first when a key is configured, then the operator token file.
async fn build_solver(config: &Config) -> Result<Arc<dyn CaptchaSolver>> {
    let mut solvers: Vec<Box<dyn CaptchaSolver>> = Vec::new();
    if let Some(key) = config.captcha.api_key.as_deref() {
        let solver = TwoCaptchaSolver::new(key)?
            .with_timeout(Duration::from_secs(config.captcha.solver_timeout_secs));
        match solver.balance().await {
            Ok(balance) => info!(balance, "2captcha account balance"),
            Err(error) => warn!(%error, "could not read 2captcha balance"),
        }
        solvers.push(Box::new(solver));
    }
    let token_path = config.captcha_token_path();
    info!(
        token_file = %token_path.display(),
        "unsolved challenges wait for a token in this file"
    );
    solvers.push(Box::new(OperatorSolver::new(
        token_path,
        config.captcha_timeout(),
    )));
    Ok(Arc::new(FallbackSolver::new(solvers)))
}
