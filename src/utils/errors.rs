//! Error types for patchwatch
//!
//! All error types use thiserror for clean error handling.
//! SECURITY: Error messages MUST NOT contain passwords or sensitive data.

use std::path::PathBuf;
use std::time::Duration;

/// Errors from remote session operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed")]
    Authentication,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),
}

/// Errors from credential storage operations
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Invalid credential format")]
    InvalidFormat,

    #[error("Invalid username format: {0}")]
    InvalidUsername(String),
}

/// Errors raised while loading the run configuration
///
/// These are the only run-level fatal errors; everything per host is folded
/// into the audit records.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from writing report artifacts
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Report I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
