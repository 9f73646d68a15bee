//! CLI command handlers.

mod archive;
mod clear;
mod scrape;
mod status;

pub use archive::{run_check_archive_command, run_upload_command, run_verify_archive_command};
pub use clear::run_clear_command;
pub use scrape::run_scrape_command;
pub use status::run_status_command;
