//! Archive sync: finds manuals already preserved on the archive, uploads
//! downloaded ones, and verifies that archived ones are still there.
//!
//! Every item maps to one deterministic identifier
//! (`{source}-id-{source_id}`), so the checker, the uploader and the
//! download engine's pre-check all agree on where an item lives.

mod checker;
mod client;
mod error;
mod identifier;
mod metadata;
mod uploader;
mod verify;

pub use checker::{ArchiveChecker, CheckOptions, CheckPacing, CheckSummary};
pub use client::{ArchiveClient, ArchiveCredentials};
pub use error::ArchiveError;
pub use identifier::{identifier_for, item_identifier, sanitize_identifier};
pub use metadata::{UploadMetadata, strip_xml_controls, upload_title};
pub use uploader::{UploadOptions, UploadPreview, UploadSummary, Uploader};
pub use verify::{VerifyReport, verify_archived};
