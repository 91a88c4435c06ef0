//! Typed settings shared by every harness workflow.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default download cache directory.
pub const DEFAULT_DOWNLOAD_DIR: &str = "/tmp/download";
/// Default upload cache directory when no mount path is configured.
pub const DEFAULT_UPLOAD_DIR: &str = "/tmp/upload";
/// Default directory for retrieved metadata snapshots.
pub const DEFAULT_METADATA_DIR: &str = "/tmp/metadata";

/// Package flavour of the replayed build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    /// Maven repositories.
    #[default]
    Maven,
    /// npm registries.
    Npm,
}

impl PackageType {
    /// Path segment used by the server API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Maven => "maven",
            Self::Npm => "npm",
        }
    }

    /// Alias of the public upstream remote for this package type.
    #[must_use]
    pub const fn central_name(self) -> &'static str {
        match self {
            Self::Maven => "central",
            Self::Npm => "npmjs",
        }
    }

    /// Upstream URL the session remote repository proxies.
    #[must_use]
    pub const fn upstream_url(self) -> &'static str {
        match self {
            Self::Maven => "https://repo.maven.apache.org/maven2/",
            Self::Npm => "https://registry.npmjs.org/",
        }
    }
}

impl Display for PackageType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Client-credentials settings for the bearer-token authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeycloakSettings {
    /// Base URL of the identity server.
    pub server_url: String,
    /// Realm issuing the tokens.
    pub realm: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_credential: String,
}

impl KeycloakSettings {
    /// Token endpoint for the configured realm.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!(
            "{}/auth/realms/{}/protocol/openid-connect/token",
            self.server_url.trim_end_matches('/'),
            self.realm
        )
    }
}

/// Settings read from the process environment that no CLI flag covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSettings {
    /// Root for per-record upload caches.
    pub test_mount_path: Option<PathBuf>,
    /// Optional token authenticator settings.
    pub keycloak: Option<KeycloakSettings>,
}

/// Local directories used while replaying a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    /// Where downloaded artifacts land.
    pub download_dir: PathBuf,
    /// Upload cache directory, or the root of per-record caches.
    pub upload_root: PathBuf,
    /// Whether `upload_root` holds one directory per tracking record.
    pub per_record: bool,
    /// Where metadata snapshots are written.
    pub metadata_dir: PathBuf,
}

impl Default for CacheLayout {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            upload_root: PathBuf::from(DEFAULT_UPLOAD_DIR),
            per_record: false,
            metadata_dir: PathBuf::from(DEFAULT_METADATA_DIR),
        }
    }
}

impl CacheLayout {
    /// Derive the layout from the environment settings.
    #[must_use]
    pub fn from_settings(settings: &EnvironmentSettings) -> Self {
        settings
            .test_mount_path
            .as_ref()
            .map_or_else(Self::default, |mount| Self {
                upload_root: mount.clone(),
                per_record: true,
                ..Self::default()
            })
    }

    /// Layout with every directory placed under `root`.
    #[must_use]
    pub fn rooted(root: &Path) -> Self {
        Self {
            download_dir: root.join("download"),
            upload_root: root.join("upload"),
            per_record: false,
            metadata_dir: root.join("metadata"),
        }
    }

    /// Upload cache directory for a tracking record.
    #[must_use]
    pub fn upload_dir(&self, tracking_id: &str) -> PathBuf {
        if self.per_record {
            self.upload_root.join(tracking_id).join("upload")
        } else {
            self.upload_root.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_type_serializes_lowercase() {
        let value = serde_json::to_string(&PackageType::Npm).expect("serialize");
        assert_eq!(value, "\"npm\"");
        assert_eq!(PackageType::Maven.central_name(), "central");
        assert_eq!(PackageType::Npm.central_name(), "npmjs");
    }

    #[test]
    fn upload_dir_is_per_record_under_mount() {
        let settings = EnvironmentSettings {
            test_mount_path: Some(PathBuf::from("/mnt/tests")),
            keycloak: None,
        };
        let layout = CacheLayout::from_settings(&settings);
        assert_eq!(
            layout.upload_dir("build-42"),
            PathBuf::from("/mnt/tests/build-42/upload")
        );
        assert_eq!(layout.download_dir, PathBuf::from(DEFAULT_DOWNLOAD_DIR));

        let plain = CacheLayout::from_settings(&EnvironmentSettings::default());
        assert_eq!(plain.upload_dir("build-42"), PathBuf::from(DEFAULT_UPLOAD_DIR));
    }

    #[test]
    fn token_url_trims_trailing_slash() {
        let settings = KeycloakSettings {
            server_url: "https://sso.example.com/".to_string(),
            realm: "builds".to_string(),
            client_id: "harness".to_string(),
            client_credential: "secret".to_string(),
        };
        assert_eq!(
            settings.token_url(),
            "https://sso.example.com/auth/realms/builds/protocol/openid-connect/token"
        );
    }
}
