//! Session repository lifecycle: hosted, remote and group stores.
//!
//! # Design
//! - Creation is ordered hosted, remote, group. The group is created without
//!   the remote first and updated to include it afterwards, so not-found-cache
//!   behaviour can be observed at both steps.
//! - Any create failure is fatal. Deletion is best-effort and restricted to
//!   repositories carrying the reserved test prefix.

use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::http::IndyClient;
use crate::model::{BuildMetadata, is_test_repository};
use crate::templates::{group_definition, hosted_definition, remote_definition};

/// Path expected to be missing upstream, used to populate the NFC.
pub const MISSING_CONTENT_PATH: &str = "org/missing/1.0/missing-1.0.pom";
/// Path expected to be served by the upstream remote.
pub const ACCESSIBLE_REMOTE_PATH: &str = "org/apache/apache";

/// Observed not-found-cache state for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NfcStatus {
    /// The missing path returned 404 through the remote.
    pub missing_not_found: bool,
    /// The remote NFC lists the missing path.
    pub remote_cached: bool,
    /// The group NFC lists the missing path.
    pub group_cached: bool,
}

/// Accessibility of the well-known upstream path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergedPaths {
    /// Served by the remote.
    pub remote: bool,
    /// Served by the group.
    pub group: bool,
}

/// Creates and removes the repositories of one session on the target server.
#[derive(Clone)]
pub struct Provisioner {
    client: IndyClient,
    base: String,
    meta: BuildMetadata,
    verify: bool,
}

impl Provisioner {
    /// Provisioner for `base_url` (with or without trailing slash).
    #[must_use]
    pub fn new(client: IndyClient, base_url: &str, meta: BuildMetadata) -> Self {
        Self {
            client,
            base: base_url.trim_end_matches('/').to_string(),
            meta,
            verify: false,
        }
    }

    /// Enable the NFC and merged-path checks between provisioning steps.
    #[must_use]
    pub const fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Session metadata.
    #[must_use]
    pub const fn metadata(&self) -> &BuildMetadata {
        &self.meta
    }

    /// Client used for all calls.
    #[must_use]
    pub const fn client(&self) -> &IndyClient {
        &self.client
    }

    /// Server base URL without trailing slash.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Store key for a repository of the session package type.
    #[must_use]
    pub fn key(&self, kind: &str, name: &str) -> String {
        format!("{}:{kind}:{name}", self.meta.package_type)
    }

    /// Admin URL of a store.
    #[must_use]
    pub fn store_url(&self, kind: &str, name: &str) -> String {
        format!(
            "{}/api/admin/stores/{}/{kind}/{name}",
            self.base, self.meta.package_type
        )
    }

    /// Content URL of a path inside a store.
    #[must_use]
    pub fn content_url(&self, kind: &str, name: &str, path: &str) -> String {
        format!(
            "{}/api/content/{}/{kind}/{name}/{}",
            self.base,
            self.meta.package_type,
            path.trim_start_matches('/')
        )
    }

    /// Constituents of the session group: hosted, shared group, then the
    /// remote once added, then caller-supplied repositories.
    #[must_use]
    pub fn group_constituents(
        &self,
        name: &str,
        include_remote: bool,
        additional_repos: &[String],
    ) -> Vec<String> {
        let mut constituents = vec![
            self.key("hosted", name),
            self.key("group", &self.meta.shared_group),
        ];
        if include_remote {
            constituents.push(self.key("remote", name));
        }
        constituents.extend(additional_repos.iter().cloned());
        constituents
    }

    /// Constituent lists for the create call and the follow-up update call.
    #[must_use]
    pub fn group_phases(&self, name: &str, additional_repos: &[String]) -> [Vec<String>; 2] {
        [
            self.group_constituents(name, false, additional_repos),
            self.group_constituents(name, true, additional_repos),
        ]
    }

    async fn put_definition(
        &self,
        kind: &str,
        name: &str,
        document: &serde_json::Value,
        step: &'static str,
    ) -> HarnessResult<()> {
        let url = self.store_url(kind, name);
        info!(store = %self.key(kind, name), step, "putting repository definition");
        if self.client.put_text(&url, document.to_string()).await.success {
            info!(
                store = %self.key(kind, name),
                url = %url,
                step,
                "repository definition accepted"
            );
            Ok(())
        } else {
            Err(HarnessError::Provision {
                store: self.key(kind, name),
                step,
            })
        }
    }

    /// Create the hosted repository.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Provision`] when the server rejects the definition.
    pub async fn create_hosted(&self, name: &str) -> HarnessResult<()> {
        let document = hosted_definition(self.meta.package_type, name);
        self.put_definition("hosted", name, &document, "create hosted")
            .await?;
        if self.verify {
            self.verify_store_state("hosted", name).await;
        }
        Ok(())
    }

    /// Create the remote repository.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Provision`] when the server rejects the definition.
    pub async fn create_remote(&self, name: &str) -> HarnessResult<()> {
        let document = remote_definition(self.meta.package_type, name);
        self.put_definition("remote", name, &document, "create remote")
            .await?;
        if self.verify {
            self.verify_store_state("remote", name).await;
        }
        Ok(())
    }

    /// Create or replace the group with the given constituents.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Provision`] when the server rejects the definition.
    pub async fn put_group(
        &self,
        name: &str,
        constituents: &[String],
        step: &'static str,
    ) -> HarnessResult<()> {
        let document = group_definition(self.meta.package_type, name, constituents);
        self.put_definition("group", name, &document, step).await
    }

    /// Two-phase group creation: without the remote, then with it.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Provision`] when either call is rejected.
    pub async fn create_group(&self, name: &str, additional_repos: &[String]) -> HarnessResult<()> {
        let [initial, updated] = self.group_phases(name, additional_repos);
        self.put_group(name, &initial, "create group").await?;
        if self.verify {
            self.verify_nfc(name).await;
            self.verify_merged_paths(name).await;
        }
        self.put_group(name, &updated, "add remote to group")
            .await?;
        if self.verify {
            self.verify_nfc(name).await;
            self.verify_merged_paths(name).await;
        }
        Ok(())
    }

    /// Provision hosted, remote and group repositories for `name`.
    ///
    /// # Errors
    ///
    /// Returns the first [`HarnessError::Provision`] encountered; later steps are skipped.
    pub async fn provision(&self, name: &str, additional_repos: &[String]) -> HarnessResult<()> {
        self.create_hosted(name).await?;
        self.create_remote(name).await?;
        self.create_group(name, additional_repos).await
    }

    /// Delete group, hosted and remote (with content). Returns `true` when all
    /// three deletions succeeded; refuses names without the test prefix.
    pub async fn delete_all(&self, name: &str) -> bool {
        if !is_test_repository(name) {
            warn!(repo = name, "refusing to delete repositories without the test prefix");
            return false;
        }
        let mut all = true;
        for kind in ["group", "hosted", "remote"] {
            all &= self.delete_store(kind, name).await;
        }
        all
    }

    /// Delete one store with its content.
    pub async fn delete_store(&self, kind: &str, name: &str) -> bool {
        let url = format!("{}?deleteContent=true", self.store_url(kind, name));
        info!(store = %self.key(kind, name), "deleting repository");
        let deleted = self.client.delete(&url).await.success;
        if deleted {
            info!(store = %self.key(kind, name), "repository deleted");
        } else {
            warn!(store = %self.key(kind, name), url = %url, "repository deletion failed");
        }
        if self.verify {
            self.verify_store_state(kind, name).await;
        }
        deleted
    }

    /// Log whether the store definition and its content root exist.
    /// Returns `true` when the definition is gone.
    pub async fn verify_store_state(&self, kind: &str, name: &str) -> bool {
        let definition = self.client.get(&self.store_url(kind, name)).await.status;
        let content = self
            .client
            .get(&format!(
                "{}/api/content/{}/{kind}/{name}",
                self.base, self.meta.package_type
            ))
            .await
            .status;
        info!(
            store = %self.key(kind, name),
            definition_status = definition,
            content_status = content,
            "repository state"
        );
        definition == 404
    }

    /// `true` when the store's NFC lists [`MISSING_CONTENT_PATH`].
    pub async fn is_nfc_cached(&self, kind: &str, name: &str) -> bool {
        let url = format!(
            "{}/api/nfc/{}/{kind}/{name}",
            self.base, self.meta.package_type
        );
        let response = self.client.get(&url).await;
        response.status == 200 && response.body.contains(MISSING_CONTENT_PATH)
    }

    /// Request a missing path through the remote and inspect the NFC of the
    /// remote and the group.
    pub async fn verify_nfc(&self, name: &str) -> NfcStatus {
        let missing = self
            .client
            .get(&self.content_url("remote", name, MISSING_CONTENT_PATH))
            .await;
        if missing.status != 404 {
            return NfcStatus::default();
        }
        let status = NfcStatus {
            missing_not_found: true,
            remote_cached: self.is_nfc_cached("remote", name).await,
            group_cached: self.is_nfc_cached("group", name).await,
        };
        info!(
            repo = name,
            remote_cached = status.remote_cached,
            group_cached = status.group_cached,
            "not-found-cache state"
        );
        status
    }

    /// Check that the upstream path is served by the remote and the group.
    pub async fn verify_merged_paths(&self, name: &str) -> MergedPaths {
        let merged = MergedPaths {
            remote: self
                .client
                .get(&self.content_url("remote", name, ACCESSIBLE_REMOTE_PATH))
                .await
                .status
                == 200,
            group: self
                .client
                .get(&self.content_url("group", name, ACCESSIBLE_REMOTE_PATH))
                .await
                .status
                == 200,
        };
        info!(
            repo = name,
            path = ACCESSIBLE_REMOTE_PATH,
            remote = merged.remote,
            group = merged.group,
            "merged path accessibility"
        );
        merged
    }
}
