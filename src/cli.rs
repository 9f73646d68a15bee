//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use manual_archiver_core::Source;

/// Scrape, download and archive scanned product manuals.
///
/// Progress is kept in a SQLite catalog, so every command can be
/// interrupted and re-run.
#[derive(Parser, Debug)]
#[command(name = "manual-archiver")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/manual-archiver/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Catalog database, overriding `database_path` from the config
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enumerate a source's listings and download pending manuals
    Scrape(ScrapeArgs),

    /// Look up pending manuals on the archive and mark those already there
    CheckArchive(CheckArchiveArgs),

    /// Upload downloaded manuals to the archive
    Upload(UploadArgs),

    /// Re-check archived manuals and report missing ones
    VerifyArchive(VerifyArgs),

    /// Show catalog counts
    Status(StatusArgs),

    /// Delete catalog rows
    Clear(ClearArgs),
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// Source to scrape: manualslib, manualsbase or manualzz
    pub source: Source,

    /// Scrape only this collection (brand slug or catalog URL); repeatable
    #[arg(long = "collection", value_name = "NAME")]
    pub collections: Vec<String>,

    /// Run site discovery even when collections are already stored
    #[arg(long)]
    pub discover: bool,

    /// Enumerate listings without downloading
    #[arg(long, conflicts_with = "download_only")]
    pub scrape_only: bool,

    /// Download pending items without enumerating listings
    #[arg(long)]
    pub download_only: bool,

    /// Delete this source's items and collections first
    #[arg(long, conflicts_with = "clear_all")]
    pub clear: bool,

    /// Delete every item and collection first
    #[arg(long)]
    pub clear_all: bool,

    /// Only download items of this brand
    #[arg(long)]
    pub brand: Option<String>,

    /// Only download items of this category
    #[arg(long)]
    pub category: Option<String>,

    /// Download at most N items
    #[arg(long, value_name = "N")]
    pub limit: Option<u32>,

    /// Skip the archive lookup before each download
    #[arg(long)]
    pub no_archive_check: bool,
}

#[derive(Args, Debug)]
pub struct CheckArchiveArgs {
    /// Keep polling for new items
    #[arg(long)]
    pub continuous: bool,

    /// Minimum seconds between probes
    #[arg(long, value_name = "S")]
    pub delay_min: Option<u64>,

    /// Maximum seconds between probes
    #[arg(long, value_name = "S")]
    pub delay_max: Option<u64>,

    /// Probe at most N items
    #[arg(long, value_name = "N")]
    pub limit: Option<u32>,

    /// Print checker statistics and exit
    #[arg(long)]
    pub stats: bool,

    /// Only check items of this source
    #[arg(long)]
    pub source: Option<Source>,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    #[arg(long)]
    pub source: Option<Source>,

    /// Upload at most N items
    #[arg(long, value_name = "N")]
    pub limit: Option<u32>,

    /// Show what would be uploaded
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Clear the archived flag of items missing from the archive
    #[arg(long)]
    pub fix: bool,

    #[arg(long)]
    pub source: Option<Source>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long)]
    pub source: Option<Source>,

    /// Number of brands to list
    #[arg(long, default_value_t = 10)]
    pub brands: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClearTarget {
    Items,
    Collections,
    All,
}

#[derive(Args, Debug)]
pub struct ClearArgs {
    /// What to delete
    #[arg(value_enum)]
    pub target: ClearTarget,

    /// Limit to one source (ignored for `all`)
    #[arg(long)]
    pub source: Option<Source>,

    /// Confirm deletion
    #[arg(long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_global_flags_anywhere() {
        let cli = Cli::try_parse_from(["manual-archiver", "status", "-vv", "--db", "x.db"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        assert!(matches!(cli.command, Command::Status(_)));
    }

    #[test]
    fn test_cli_scrape_parses_source_and_collections() {
        let cli = Cli::try_parse_from([
            "manual-archiver",
            "scrape",
            "manualslib",
            "--collection",
            "sony",
            "--collection",
            "lg",
            "--limit",
            "5",
        ])
        .unwrap();
        let Command::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        assert_eq!(args.source, Source::ManualsLib);
        assert_eq!(args.collections, vec!["sony", "lg"]);
        assert_eq!(args.limit, Some(5));
        assert!(!args.scrape_only);
    }

    #[test]
    fn test_cli_scrape_rejects_unknown_source() {
        let err = Cli::try_parse_from(["manual-archiver", "scrape", "example"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_scrape_only_conflicts_with_download_only() {
        let err = Cli::try_parse_from([
            "manual-archiver",
            "scrape",
            "manualzz",
            "--scrape-only",
            "--download-only",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_clear_target() {
        let cli =
            Cli::try_parse_from(["manual-archiver", "clear", "collections", "--yes"]).unwrap();
        let Command::Clear(args) = cli.command else {
            panic!("expected clear");
        };
        assert_eq!(args.target, ClearTarget::Collections);
        assert!(args.yes);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let err = Cli::try_parse_from(["manual-archiver"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }
}
