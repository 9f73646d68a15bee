//! Manual Archiver Core Library
//!
//! Scrapes scanned product manuals from document-hosting sites, downloads
//! them into a content-addressed store, and syncs them to a public archive.
//! Every step is resumable: progress lives in a SQLite catalog shared by
//! independent processes.
//!
//! # Architecture
//!
//! - [`catalog`] - item and collection state (the durable checkpoint)
//! - [`blob`] - SHA-256 content-addressed file store
//! - [`adapter`] - per-site enumeration and download resolution
//! - [`scrape`] - drives adapters over collections into the catalog
//! - [`download`] - HTTP client, CAPTCHA solving and the download engine
//! - [`archive`] - archive existence checks, uploads and verification
//! - [`config`] - TOML configuration with environment overrides

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod archive;
pub mod blob;
pub mod catalog;
pub mod config;
pub mod db;
pub mod download;
pub mod scrape;
mod user_agent;

// Re-export commonly used types
pub use adapter::{AdapterError, AdapterRegistry, HostBlocklist, SiteAdapter};
pub use archive::{ArchiveChecker, ArchiveClient, ArchiveError, Uploader};
pub use blob::{BlobError, BlobPut, BlobStore, Checksums};
pub use catalog::{Catalog, CatalogError, ManualItem, NewManual, Source};
pub use config::{Config, ConfigError, LoadedConfig};
pub use db::Database;
pub use download::{
    CircuitBreaker, DEFAULT_MAX_RETRIES, DownloadEngine, DownloadError, EngineError, HttpClient,
    RetryPolicy, RunSummary,
};
pub use scrape::{Enumerator, ScrapeError, ScrapeOptions, ScrapeSummary};
pub use user_agent::BROWSER_USER_AGENT;
