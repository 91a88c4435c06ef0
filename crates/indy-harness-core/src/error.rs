//! # Design
//!
//! - Centralize harness errors for provisioning, replay, and verification.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Harness-level error type.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The server address could not be used.
    #[error("invalid indy server")]
    InvalidServer {
        /// Address as supplied by the operator.
        address: String,
        /// Machine-readable reason for the failure.
        reason: String,
    },
    /// An HTTP request could not be sent or read.
    #[error("http transport failed")]
    Transport {
        /// Request URL.
        url: String,
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// The server answered with a failure status.
    #[error("unexpected http status")]
    Status {
        /// Request URL.
        url: String,
        /// Response status code.
        status: u16,
    },
    /// A filesystem operation failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the operation.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A JSON document could not be decoded or encoded.
    #[error("json processing failed")]
    Json {
        /// Document origin (URL or path).
        origin: String,
        /// Underlying serde error.
        source: serde_json::Error,
    },
    /// A downloaded artifact did not match its recorded checksum.
    #[error("checksum mismatch")]
    ChecksumMismatch {
        /// Local file that was checked.
        path: PathBuf,
        /// Recorded checksum.
        expected: String,
        /// Computed checksum.
        actual: String,
    },
    /// A repository could not be created or updated.
    #[error("repository provisioning failed")]
    Provision {
        /// Store key of the repository.
        store: String,
        /// Provisioning step identifier.
        step: &'static str,
    },
    /// A transfer batch did not complete successfully.
    #[error("transfer batch failed")]
    BatchFailed {
        /// Batch identifier (downloads, uploads, ...).
        batch: &'static str,
        /// Number of failed items.
        failed: usize,
        /// Number of attempted items.
        attempted: usize,
    },
    /// Obtaining a bearer token failed.
    #[error("authentication failed")]
    Auth {
        /// Token endpoint.
        url: String,
        /// Human-readable failure description.
        reason: String,
    },
    /// A tracking record cannot drive the requested workflow.
    #[error("invalid tracking record")]
    InvalidRecord {
        /// Record identifier.
        id: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// An external git command failed.
    #[error("git command failed")]
    Git {
        /// Repository URL.
        url: String,
        /// Captured stderr or spawn failure.
        detail: String,
    },
    /// A server-side behaviour check did not hold.
    #[error("server verification failed")]
    Verification {
        /// Check identifier.
        check: &'static str,
        /// URL, store or path the check inspected.
        subject: String,
    },
    /// A YAML document could not be encoded.
    #[error("yaml encoding failed")]
    Yaml {
        /// Underlying serde error.
        source: serde_yaml::Error,
    },
}

impl HarnessError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn verification(check: &'static str, subject: impl Into<String>) -> Self {
        Self::Verification {
            check,
            subject: subject.into(),
        }
    }

    /// One-line description including the context fields.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::InvalidServer { address, reason } => format!("{address}: {reason}"),
            Self::Transport { url, source } => format!("{url}: {source}"),
            Self::Status { url, status } => format!("{url} returned {status}"),
            Self::Io {
                operation,
                path,
                source,
            } => format!("{operation} {}: {source}", path.display()),
            Self::Json { origin, source } => format!("{origin}: {source}"),
            Self::ChecksumMismatch {
                path,
                expected,
                actual,
            } => format!("{}: expected md5 {expected}, got {actual}", path.display()),
            Self::Provision { store, step } => format!("{step} {store}"),
            Self::BatchFailed {
                batch,
                failed,
                attempted,
            } => format!("{batch}: {failed} of {attempted} items failed"),
            Self::Auth { url, reason } => format!("{url}: {reason}"),
            Self::InvalidRecord { id, reason } => format!("{id}: {reason}"),
            Self::Git { url, detail } => format!("{url}: {detail}"),
            Self::Verification { check, subject } => format!("{check}: {subject}"),
            Self::Yaml { source } => source.to_string(),
        }
    }
}
