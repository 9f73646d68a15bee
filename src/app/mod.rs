//! Process-level helpers shared by the command handlers.

pub(crate) mod exit_handler;
pub(crate) mod progress_manager;
pub(crate) mod terminal;
