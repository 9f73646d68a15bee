//! Page fetching, file transfer and the per-source download engine.
//!
//! # Overview
//!
//! - [`HttpClient`] fetches pages and streams files to disk with retries
//!   ([`RetryPolicy`]: exponential backoff with jitter, Retry-After on 429)
//! - [`DelayRange`] paces navigations and items
//! - [`CaptchaSolver`] implementations turn a challenge into a token
//! - [`DownloadEngine`] drives pending items to the blob store
//!
//! # Example
//!
//! ```no_run
//! use manual_archiver_core::download::{ClientOptions, FetchRequest, HttpClient};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(&ClientOptions::default())?;
//! let file = client
//!     .fetch_to_file(
//!         &FetchRequest::get("https://www.manualslib.com/download/1.pdf"),
//!         Path::new("/tmp/manual.part"),
//!     )
//!     .await?;
//! file.verify()?;
//! # Ok(())
//! # }
//! ```

mod captcha;
mod circuit_breaker;
mod client;
mod constants;
mod engine;
mod error;
mod filename;
mod pacing;
mod retry;

pub use captcha::{CaptchaError, CaptchaSolver, FallbackSolver, OperatorSolver, TwoCaptchaSolver};
pub use circuit_breaker::CircuitBreaker;
pub use client::{ClientOptions, FetchRequest, FetchedFile, HttpClient, Page};
pub use engine::{
    DownloadEngine, EngineError, ItemError, ItemFailure, ItemOutcome, Phase, RunSummary,
};
pub use error::DownloadError;
pub use pacing::{DelayRange, parse_retry_after};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};

pub(crate) use filename::expected_filename;

// Note: no module-local Result aliases; signatures spell out
// `Result<T, DownloadError>`.
