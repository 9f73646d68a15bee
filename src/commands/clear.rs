//! Clear command handler: delete catalog rows.

use anyhow::{Result, bail};
use manual_archiver_core::Catalog;

use crate::cli::{ClearArgs, ClearTarget};

pub async fn run_clear_command(args: &ClearArgs, catalog: &Catalog) -> Result<()> {
    if !args.yes {
        bail!(
            "refusing to delete catalog rows without confirmation\n  \
             Suggestion: re-run with --yes"
        );
    }
    let scope = args
        .source
        .map_or_else(|| "all sources".to_string(), |s| s.display_name().to_string());

    match args.target {
        ClearTarget::Items => {
            let removed = catalog.clear_items(args.source).await?;
            println!("Deleted {removed} items ({scope}).");
        }
        ClearTarget::Collections => {
            let removed = catalog.clear_collections(args.source).await?;
            println!("Deleted {removed} collections ({scope}).");
        }
        ClearTarget::All => {
            let (items, collections) = catalog.clear_everything().await?;
            println!("Deleted {items} items and {collections} collections.");
        }
    }
    Ok(())
}
