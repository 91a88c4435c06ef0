//! Tracking record model and session naming.

use std::fmt::{self, Display, Formatter};

use indy_harness_config::PackageType;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Reserved prefix of every repository the harness creates.
pub const BUILD_TEST_PREFIX: &str = "build-test-";
/// Shared group folded into every session group.
pub const DEFAULT_SHARED_GROUP: &str = "builds-untested+shared-imports+public";
/// Access channel for direct store content access.
pub const CHANNEL_GENERIC_PROXY: &str = "GENERIC_PROXY";
/// Access channel for regular build traffic.
pub const CHANNEL_NATIVE: &str = "NATIVE";

const BUILD_NUMBER_MIN: u32 = 900_000;
const BUILD_NUMBER_MAX: u32 = 999_999;

/// Identifier block of a tracking record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingKey {
    /// Build identifier the record was collected under.
    #[serde(default)]
    pub id: String,
}

/// Recorded artifact I/O of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedContent {
    /// Identifier of the record.
    #[serde(rename = "key", default)]
    pub tracking_key: TrackingKey,
    /// Artifacts the build uploaded, in record order.
    #[serde(default)]
    pub uploads: Vec<TrackedContentEntry>,
    /// Artifacts the build downloaded, in record order.
    #[serde(default)]
    pub downloads: Vec<TrackedContentEntry>,
}

/// One recorded artifact access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackedContentEntry {
    /// How the build reached the content (`NATIVE`, `GENERIC_PROXY`, ...).
    pub access_channel: String,
    /// Repository-relative path, with a leading slash.
    pub path: String,
    /// Upstream URL the content was fetched from, if any.
    pub origin_url: String,
    /// URL of the content on the recording server.
    pub local_url: String,
    /// Recorded access effect (`DOWNLOAD`, `UPLOAD`).
    pub effect: String,
    /// Hex MD5 of the content.
    pub md5: String,
    /// Hex SHA-256 of the content.
    pub sha256: String,
    /// Hex SHA-1 of the content.
    pub sha1: String,
    /// Content length in bytes.
    pub size: i64,
    /// Access timestamps in epoch milliseconds.
    pub timestamps: Vec<i64>,
    /// Store the content was accessed through.
    pub store_key: String,
}

impl TrackedContentEntry {
    /// Entries without a path or store key cannot be replayed.
    #[must_use]
    pub fn is_replayable(&self) -> bool {
        !self.path.is_empty() && !self.store_key.is_empty()
    }
}

/// Parsed `packageType:storeType:storeName` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    /// Package type segment (`maven`, `npm`).
    pub package: String,
    /// Store type segment (`hosted`, `remote`, `group`).
    pub kind: String,
    /// Store name.
    pub name: String,
}

impl StoreKey {
    /// Build a key from its parts.
    #[must_use]
    pub fn new(
        package: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Parse a composite key; all three segments must be present.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(package), Some(kind), Some(name))
                if !package.is_empty() && !kind.is_empty() && !name.is_empty() =>
            {
                Some(Self::new(package, kind, name))
            }
            _ => None,
        }
    }

    /// API path form of the key, e.g. `maven/hosted/shared-imports`.
    #[must_use]
    pub fn to_path(&self) -> String {
        format!("{}/{}/{}", self.package, self.kind, self.name)
    }
}

impl Display for StoreKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}:{}", self.package, self.kind, self.name)
    }
}

/// Map a store key string to its API path form.
#[must_use]
pub fn store_key_to_path(store_key: &str) -> String {
    store_key.replace(':', "/")
}

/// Unique namespace token for one replay session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildName(String);

impl BuildName {
    /// Pick a fresh `build-test-<n>` name. No collision check is made against
    /// the target server.
    #[must_use]
    pub fn generate() -> Self {
        let number = rand::rng().random_range(BUILD_NUMBER_MIN..BUILD_NUMBER_MAX);
        Self(format!("{BUILD_TEST_PREFIX}{number}"))
    }

    /// Accept an existing name carrying the reserved prefix.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        raw.strip_prefix(BUILD_TEST_PREFIX)
            .filter(|suffix| !suffix.is_empty())
            .map(|_| Self(raw.to_string()))
    }

    /// Name as used for repositories and tracking ids.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Version marker derived from the name, e.g. `94465`.
    #[must_use]
    pub fn version_suffix(&self) -> &str {
        self.0.strip_prefix(BUILD_TEST_PREFIX).unwrap_or(&self.0)
    }
}

impl Display for BuildName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Returns `true` when `name` carries the reserved test prefix.
#[must_use]
pub fn is_test_repository(name: &str) -> bool {
    name.starts_with(BUILD_TEST_PREFIX)
}

/// Describes the target of a replay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMetadata {
    /// Package type of the session repositories.
    pub package_type: PackageType,
    /// Public remote alias for this package type.
    pub central_name: &'static str,
    /// Pre-existing group folded into the session group.
    pub shared_group: String,
}

impl BuildMetadata {
    /// Defaults for the given package type.
    #[must_use]
    pub fn for_package(package_type: PackageType) -> Self {
        Self {
            package_type,
            central_name: package_type.central_name(),
            shared_group: DEFAULT_SHARED_GROUP.to_string(),
        }
    }
}
