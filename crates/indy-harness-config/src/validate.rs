//! Parsing helpers for settings supplied as strings.

use crate::error::{ConfigError, ConfigResult};
use crate::model::PackageType;

/// Parse a package type, case-insensitively.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] for anything other than `maven` or `npm`.
pub fn parse_package_type(value: &str) -> ConfigResult<PackageType> {
    match value.trim().to_ascii_lowercase().as_str() {
        "maven" => Ok(PackageType::Maven),
        "npm" => Ok(PackageType::Npm),
        _ => Err(ConfigError::InvalidValue {
            name: "package type",
            value: value.to_string(),
            reason: "must be maven or npm",
        }),
    }
}

/// Parse a worker count.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] unless the value is an integer of at least one.
pub fn parse_workers(value: &str) -> ConfigResult<usize> {
    match value.trim().parse::<usize>() {
        Ok(workers) if workers >= 1 => Ok(workers),
        _ => Err(ConfigError::InvalidValue {
            name: "workers",
            value: value.to_string(),
            reason: "must be a positive integer",
        }),
    }
}
