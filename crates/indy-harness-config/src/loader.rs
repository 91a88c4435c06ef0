//! Environment lookup for settings that are not exposed as CLI flags.
//!
//! # Design
//! - Parsing goes through an injectable lookup so tests never touch the
//!   process environment.
//! - Empty variables are treated as unset.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{EnvironmentSettings, KeycloakSettings};

/// Target server used when `--target` is not passed.
pub const ENV_TARGET: &str = "INDY_TARGET";
/// Package type used when `--package-type` is not passed.
pub const ENV_BUILD_TYPE: &str = "INDY_BUILD_TYPE";
/// Worker count used when `--workers` is not passed.
pub const ENV_BUILD_PROC_NUM: &str = "BUILD_PROC_NUM";
/// Root for per-record upload caches.
pub const ENV_TEST_MOUNT_PATH: &str = "TEST_MOUNT_PATH";
/// Identity server base URL.
pub const ENV_KEYCLOAK_SERVER_URL: &str = "KEYCLOAK_SERVER_URL";
/// Identity realm.
pub const ENV_KEYCLOAK_REALM: &str = "KEYCLOAK_REALM";
/// Client identifier.
pub const ENV_KEYCLOAK_CLIENT_ID: &str = "KEYCLOAK_CLIENT_ID";
/// Client secret.
pub const ENV_KEYCLOAK_CLIENT_CREDENTIAL: &str = "KEYCLOAK_CLIENT_CREDENTIAL";

impl EnvironmentSettings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when only some of the keycloak variables are set.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error when only some of the keycloak variables are set.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let test_mount_path = read(ENV_TEST_MOUNT_PATH).map(PathBuf::from);
        let keycloak = keycloak_from(&read)?;
        debug!(
            mount = ?test_mount_path,
            keycloak = keycloak.is_some(),
            "loaded environment settings"
        );

        Ok(Self {
            test_mount_path,
            keycloak,
        })
    }
}

fn keycloak_from<F>(read: &F) -> ConfigResult<Option<KeycloakSettings>>
where
    F: Fn(&str) -> Option<String>,
{
    let names = [
        ENV_KEYCLOAK_SERVER_URL,
        ENV_KEYCLOAK_REALM,
        ENV_KEYCLOAK_CLIENT_ID,
        ENV_KEYCLOAK_CLIENT_CREDENTIAL,
    ];
    let values: Vec<Option<String>> = names.iter().map(|name| read(name)).collect();
    let missing: Vec<&'static str> = names
        .iter()
        .zip(&values)
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();

    if missing.len() == names.len() {
        return Ok(None);
    }
    if !missing.is_empty() {
        return Err(ConfigError::IncompleteKeycloak { missing });
    }

    let mut values = values.into_iter().flatten();
    match (values.next(), values.next(), values.next(), values.next()) {
        (Some(server_url), Some(realm), Some(client_id), Some(client_credential)) => {
            Ok(Some(KeycloakSettings {
                server_url,
                realm,
                client_id,
                client_credential,
            }))
        }
        _ => Err(ConfigError::IncompleteKeycloak {
            missing: names.to_vec(),
        }),
    }
}
