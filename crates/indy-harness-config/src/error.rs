//! Error types for configuration operations.

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Primary error type for configuration operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A value failed validation.
    #[error("invalid configuration value")]
    InvalidValue {
        /// Setting name (environment variable or flag).
        name: &'static str,
        /// Offending value.
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Only part of the token authenticator settings were provided.
    #[error("incomplete keycloak configuration")]
    IncompleteKeycloak {
        /// Variables that were not set.
        missing: Vec<&'static str>,
    },
}

impl ConfigError {
    /// Human-readable description including the context fields.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::InvalidValue {
                name,
                value,
                reason,
            } => format!("{name}={value:?}: {reason}"),
            Self::IncompleteKeycloak { missing } => {
                format!("missing {}", missing.join(", "))
            }
        }
    }
}
