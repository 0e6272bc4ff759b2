use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tasker_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Not logged in. Run `tasker login <username>` first.")]
    NotLoggedIn,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Too many failed attempts; try again after {0}")]
    LockedOut(String),
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Task ID cannot be empty")]
    EmptyTaskId,
    #[error("Task not found for id/prefix: {0}")]
    TaskNotFound(String),
    #[error("{0}")]
    AmbiguousTaskId(String),
    #[error("Invalid date '{0}'; expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Nothing to update; pass at least one field flag")]
    NothingToUpdate,
    #[error(
        "Sync is not configured. Run `tasker setup --url <URL> --token <TOKEN>`, or set TASKER_REMOTE_URL and TASKER_REMOTE_TOKEN."
    )]
    SyncNotConfigured,
    #[error("Remote store is unreachable; changes stay queued locally")]
    RemoteUnavailable,
}
