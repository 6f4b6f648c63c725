//! Error types module
//!
//! `AppError` covers persistence and general failures. `UploadError` carries the
//! upload taxonomy the worker branches on: every variant knows its class, whether
//! a re-queue can help, and the level it should be logged at.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Message the remote API client reports when the session token is rejected.
pub const INVALID_TOKEN_ERROR_MESSAGE: &str = "Invalid token, or login session has expired";

/// Server error codes meaning the stash no longer holds usable chunks. A chunk
/// checkpoint must be discarded before the transfer is retried.
pub const STASH_ERROR_CODES: [&str; 4] = [
    "uploadstash-file-not-found",
    "stashfailed",
    "verification-error",
    "chunk-too-small",
];

pub fn is_stash_error_code(code: &str) -> bool {
    STASH_ERROR_CODES.contains(&code)
}

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected outcomes such as auto-resolved name collisions
    Debug,
    /// Warning level - for recoverable or swallowed issues
    Warn,
    /// Error level - for failures that end an upload attempt or a drain cycle
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration failed: {}", err))
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Failure classes of the upload pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retryable by re-queueing the contribution.
    TransientNetwork,
    /// The stash lost its chunks; the checkpoint must be reset.
    Stash,
    /// Resolved internally by picking another name.
    NameCollision,
    /// Terminal for this attempt; checkpoint cleared.
    CommitFailure,
    /// Swallowed; never fails the primary flow.
    SecondaryEdit,
    /// The session is no longer valid.
    InvalidLogin,
    /// Aborts the whole drain cycle.
    FatalWorker,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Stash error {code}: {info}")]
    Stash { code: String, info: String },

    #[error("File name already taken: {0}")]
    NameCollision(String),

    #[error("Commit from stash failed: {0}")]
    Commit(String),

    #[error("Structured data edit failed: {0}")]
    SecondaryEdit(String),

    #[error("{}", INVALID_TOKEN_ERROR_MESSAGE)]
    InvalidLogin,

    #[error("Store error: {0}")]
    Store(#[from] AppError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Static metadata per variant: (class, error_code, recoverable, log_level).
fn upload_error_static_metadata(err: &UploadError) -> (ErrorClass, &'static str, bool, LogLevel) {
    match err {
        UploadError::Network(_) => (
            ErrorClass::TransientNetwork,
            "NETWORK_ERROR",
            true,
            LogLevel::Warn,
        ),
        UploadError::Stash { .. } => (ErrorClass::Stash, "STASH_ERROR", true, LogLevel::Warn),
        UploadError::NameCollision(_) => (
            ErrorClass::NameCollision,
            "NAME_COLLISION",
            true,
            LogLevel::Debug,
        ),
        UploadError::Commit(_) => (
            ErrorClass::CommitFailure,
            "COMMIT_FAILED",
            true,
            LogLevel::Error,
        ),
        UploadError::SecondaryEdit(_) => (
            ErrorClass::SecondaryEdit,
            "SECONDARY_EDIT_FAILED",
            false,
            LogLevel::Warn,
        ),
        UploadError::InvalidLogin => (
            ErrorClass::InvalidLogin,
            "INVALID_LOGIN",
            false,
            LogLevel::Error,
        ),
        UploadError::Store(_) => (
            ErrorClass::FatalWorker,
            "STORE_ERROR",
            false,
            LogLevel::Error,
        ),
        UploadError::Config(_) => (
            ErrorClass::FatalWorker,
            "CONFIG_ERROR",
            false,
            LogLevel::Error,
        ),
        UploadError::Internal(_) => (
            ErrorClass::FatalWorker,
            "INTERNAL_ERROR",
            false,
            LogLevel::Error,
        ),
    }
}

impl UploadError {
    pub fn class(&self) -> ErrorClass {
        upload_error_static_metadata(self).0
    }

    /// Machine-readable error code (e.g. "STASH_ERROR")
    pub fn error_code(&self) -> &'static str {
        upload_error_static_metadata(self).1
    }

    /// Whether re-queueing the contribution can succeed later
    pub fn is_recoverable(&self) -> bool {
        upload_error_static_metadata(self).2
    }

    pub fn log_level(&self) -> LogLevel {
        upload_error_static_metadata(self).3
    }

    /// Whether the chunk checkpoint must be dropped before any retry.
    pub fn requires_checkpoint_reset(&self) -> bool {
        matches!(self, UploadError::Stash { code, .. } if is_stash_error_code(code))
    }

    /// Text attached to the contribution and shown by the notification layer.
    pub fn user_message(&self) -> String {
        match self {
            UploadError::Network(msg) => msg.clone(),
            UploadError::Stash { code, .. } => code.clone(),
            UploadError::NameCollision(name) => format!("File name already taken: {}", name),
            UploadError::Commit(msg) => msg.clone(),
            UploadError::SecondaryEdit(msg) => msg.clone(),
            UploadError::InvalidLogin => INVALID_TOKEN_ERROR_MESSAGE.to_string(),
            UploadError::Store(_) => "Failed to access local storage".to_string(),
            UploadError::Config(msg) => msg.clone(),
            UploadError::Internal(_) => "Internal error".to_string(),
        }
    }
}
