//! Exit code logic for the archiver process.
//!
//! Single responsibility: map success/failure counts to the process exit outcome.

use crate::ProcessExit;

/// Determines the process exit outcome from succeeded and failed item counts.
pub(crate) fn determine_exit_outcome(succeeded: u32, failed: u32) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if succeeded > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
