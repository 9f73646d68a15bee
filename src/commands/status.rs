//! Status command handler: catalog counts.

use anyhow::Result;
use manual_archiver_core::Catalog;

use crate::cli::StatusArgs;

pub async fn run_status_command(args: &StatusArgs, catalog: &Catalog) -> Result<()> {
    let stats = catalog.stats().await?;
    println!("Items:       {}", stats.total);
    println!("Downloaded:  {}", stats.downloaded);
    println!("Archived:    {}", stats.archived);
    println!("Pending:     {}", stats.pending);

    let per_source = catalog.stats_by_source().await?;
    if !per_source.is_empty() {
        println!();
        println!(
            "{:<12} {:>8} {:>11} {:>9} {:>8}",
            "SOURCE", "TOTAL", "DOWNLOADED", "ARCHIVED", "PENDING"
        );
        for row in per_source
            .iter()
            .filter(|row| args.source.is_none_or(|s| s == row.source))
        {
            println!(
                "{:<12} {:>8} {:>11} {:>9} {:>8}",
                row.source.as_str(),
                row.total,
                row.downloaded,
                row.archived,
                row.pending
            );
        }
    }

    let collections = catalog.collection_stats(args.source).await?;
    println!();
    println!(
        "Collections: {} ({} scraped, {} pending)",
        collections.total, collections.scraped, collections.pending
    );

    let checks = catalog.archive_check_stats(args.source).await?;
    println!(
        "Archive checks: {} found, {} not found, {} never checked",
        checks.archived, checks.checked_not_archived, checks.never_checked
    );

    let brands = catalog.brand_stats(args.source, Some(args.brands)).await?;
    if !brands.is_empty() {
        println!();
        println!("Top brands:");
        for brand in &brands {
            println!(
                "  {:<24} {:>6} ({} downloaded, {} archived)",
                brand.brand, brand.total, brand.downloaded, brand.archived
            );
        }
    }
    Ok(())
}
