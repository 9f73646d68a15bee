//! Progress UI (spinner) for scrape and download runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use manual_archiver_core::{Catalog, Source};

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    catalog: Catalog,
    source: Source,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(catalog, source, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    catalog: Catalog,
    source: Source,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            let counts = catalog
                .stats_by_source()
                .await
                .unwrap_or_default()
                .into_iter()
                .find(|s| s.source == source);
            let message = match counts {
                Some(s) => format!(
                    "{}: {} items, {} downloaded, {} archived, {} pending",
                    source.display_name(),
                    s.total,
                    s.downloaded,
                    s.archived,
                    s.pending
                ),
                None => format!("{}: waiting for items...", source.display_name()),
            };
            spinner.set_message(message);
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        spinner.finish_and_clear();
    })
}

/// Signals the spinner to stop and waits for it to clear the line.
pub(crate) async fn stop_progress_ui(
    handle: Option<tokio::task::JoinHandle<()>>,
    stop: &AtomicBool,
) {
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = handle {
        let _ = handle.await;
    }
}
