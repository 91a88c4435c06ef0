//! Store-event workflow: content merging, metadata aggregation and cleanup
//! propagation across hosted, remote and group stores.
//!
//! # Design
//! - Every check is fatal; a failed check returns
//!   [`HarnessError::Verification`] naming the check and the URL.
//! - The server handles store events asynchronously, so each phase waits a
//!   settle delay before checking.

use std::sync::Arc;
use std::time::Duration;

use indy_harness_config::{CacheLayout, PackageType};
use serde_json::Value;
use tracing::info;

use crate::batch::{BatchOutcome, BatchPolicy};
use crate::error::{HarnessError, HarnessResult};
use crate::files::prepare_dir;
use crate::folo::seal_record;
use crate::http::IndyClient;
use crate::model::{BuildMetadata, BuildName, TrackedContent};
use crate::provision::{MISSING_CONTENT_PATH, Provisioner};
use crate::replay::{TransferContext, run_transfers, upload_one};
use crate::rewrite::{TransferJob, rule_for, upload_jobs};
use crate::server::validate_server;

/// Hosted POM whose version is merged into the group metadata.
pub const GOING_MERGED_HOSTED_PATH: &str = "org/apache/apache/666/apache-666.pom";
/// Group metadata aggregating hosted and remote versions.
pub const MERGED_MAVEN_METADATA_PATH: &str = "org/apache/apache/maven-metadata.xml";
/// Upstream POM served through the remote.
pub const REMOTE_POM_PATH: &str = "org/apache/apache/2/apache-2.pom";
/// Marker of the upstream version in merged metadata.
pub const REMOTE_VERSION_TAG: &str = "<version>2</version>";
/// Marker of the hosted version in merged metadata.
pub const LATEST_HOSTED_VERSION_TAG: &str = "<latest>666</latest>";
/// Content of [`GOING_MERGED_HOSTED_PATH`].
pub const HOSTED_POM_CONTENT: &str = concat!(
    "<project><modelVersion>4.0.0</modelVersion>",
    "<groupId>org.apache</groupId><artifactId>apache</artifactId>",
    "<version>666</version><packaging>pom</packaging></project>",
);
/// Default wait for asynchronous store events.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(30);

/// Inputs of the event workflow.
#[derive(Debug, Clone)]
pub struct EventOptions {
    /// Server the record was captured on.
    pub original: String,
    /// Server under test.
    pub target: String,
    /// Package type of the session repositories.
    pub package_type: PackageType,
    /// Concurrent upload workers.
    pub workers: usize,
    /// Discard cached upload content before the run.
    pub clear_cache: bool,
    /// Log mutating calls instead of sending them.
    pub dry_run: bool,
    /// Extra group constituents, as store keys.
    pub additional_repos: Vec<String>,
    /// Session name; generated when absent.
    pub build_name: Option<BuildName>,
    /// Local cache directories.
    pub cache: CacheLayout,
    /// Wait applied after each event-producing step.
    pub settle_delay: Duration,
}

impl EventOptions {
    /// Sequential run with the default cache layout and settle delay.
    #[must_use]
    pub fn new(
        original: impl Into<String>,
        target: impl Into<String>,
        package_type: PackageType,
    ) -> Self {
        Self {
            original: original.into(),
            target: target.into(),
            package_type,
            workers: 1,
            clear_cache: true,
            dry_run: false,
            additional_repos: Vec::new(),
            build_name: None,
            cache: CacheLayout::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Summary of an event run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    /// Session name.
    pub build_name: BuildName,
    /// Upload phase result.
    pub uploads: BatchOutcome,
    /// Whether the session record was sealed.
    pub sealed: bool,
}

/// Run the event workflow for `record`.
///
/// # Errors
///
/// Returns the first failed provisioning step, transfer batch or check.
pub async fn run_event(
    client: &IndyClient,
    record: &TrackedContent,
    options: &EventOptions,
) -> HarnessResult<EventReport> {
    let original = validate_server(client, &options.original).await?;
    let target = validate_server(client, &options.target).await?;
    let build = options.build_name.clone().unwrap_or_else(BuildName::generate);
    info!(build = %build, target = %target.base_url, "starting event workflow");

    let provisioner = Provisioner::new(
        client.clone(),
        &target.base_url,
        BuildMetadata::for_package(options.package_type),
    );
    let checks = EventChecks {
        provisioner: &provisioner,
        name: build.as_str(),
        delay: options.settle_delay,
    };
    if options.dry_run {
        info!(build = %build, "dry run: skipping repository provisioning");
    } else {
        checks.provision(&options.additional_repos).await?;
    }

    let upload_dir = options.cache.upload_dir(&record.tracking_key.id);
    prepare_dir(&upload_dir, options.clear_cache).await?;
    let context = Arc::new(TransferContext {
        client: client.clone(),
        download_dir: options.cache.download_dir.clone(),
        upload_dir,
        dry_run: options.dry_run,
    });
    let jobs = upload_jobs(
        &original.base_url,
        &target.base_url,
        &build,
        record,
        rule_for(options.package_type),
    );
    let hosted = hosted_paths(&jobs, options.package_type, &build);
    let uploads = run_transfers(
        "uploads",
        BatchPolicy::for_workers(options.workers),
        jobs,
        &context,
        upload_one,
    )
    .await?;

    if options.dry_run {
        info!(build = %build, "dry run: skipping sealing and teardown");
        return Ok(EventReport {
            build_name: build,
            uploads,
            sealed: false,
        });
    }
    let sealed = seal_record(client, &target.base_url, build.as_str()).await;
    checks.teardown(&hosted).await?;

    info!(build = %build, "event workflow finished");
    Ok(EventReport {
        build_name: build,
        uploads,
        sealed,
    })
}

/// Paths the uploads occupy inside the session hosted repository.
fn hosted_paths(jobs: &[TransferJob], package_type: PackageType, build: &BuildName) -> Vec<String> {
    let marker = format!("{package_type}/hosted/{build}/");
    jobs.iter()
        .filter_map(|job| job.target_url.split_once(&marker).map(|(_, path)| path.to_string()))
        .collect()
}

struct EventChecks<'a> {
    provisioner: &'a Provisioner,
    name: &'a str,
    delay: Duration,
}

impl EventChecks<'_> {
    fn client(&self) -> &IndyClient {
        self.provisioner.client()
    }

    fn content(&self, kind: &str, path: &str) -> String {
        self.provisioner.content_url(kind, self.name, path)
    }

    async fn settle(&self) {
        if !self.delay.is_zero() {
            info!(seconds = self.delay.as_secs(), "waiting for store events");
            tokio::time::sleep(self.delay).await;
        }
    }

    async fn require_present(&self, check: &'static str, url: &str) -> HarnessResult<String> {
        let response = self.client().get(url).await;
        if response.success {
            info!(check, url, "present");
            Ok(response.body)
        } else {
            Err(HarnessError::verification(check, url))
        }
    }

    async fn require_absent(&self, check: &'static str, url: &str) -> HarnessResult<()> {
        if self.client().get(url).await.success {
            Err(HarnessError::verification(check, url))
        } else {
            info!(check, url, "absent");
            Ok(())
        }
    }

    async fn require_metadata(
        &self,
        check: &'static str,
        tag: &str,
        expected: bool,
    ) -> HarnessResult<()> {
        let url = self.content("group", MERGED_MAVEN_METADATA_PATH);
        let metadata = self.require_present(check, &url).await?;
        if metadata.contains(tag) == expected {
            info!(check, url = %url, tag, expected, "merged metadata verified");
            Ok(())
        } else {
            Err(HarnessError::verification(check, url))
        }
    }

    async fn require_removed_from_group(&self, kind: &str) -> HarnessResult<()> {
        let url = self.provisioner.store_url("group", self.name);
        let body = self.require_present("group definition", &url).await?;
        let group: Value = serde_json::from_str(&body).map_err(|source| HarnessError::Json {
            origin: url.clone(),
            source,
        })?;
        let key = self.provisioner.key(kind, self.name);
        let listed = group
            .get("constituents")
            .and_then(Value::as_array)
            .is_some_and(|constituents| {
                constituents
                    .iter()
                    .any(|item| item.as_str() == Some(key.as_str()))
            });
        if listed {
            return Err(HarnessError::verification("constituent removal", key));
        }
        info!(store = %key, "store removed from group");
        Ok(())
    }

    async fn require_store(&self, kind: &str, check: &'static str) -> HarnessResult<()> {
        let url = self.provisioner.store_url(kind, self.name);
        self.require_present(check, &url).await.map(|_| ())
    }

    async fn provision(&self, additional_repos: &[String]) -> HarnessResult<()> {
        self.provisioner.create_hosted(self.name).await?;
        let pom = self.content("hosted", GOING_MERGED_HOSTED_PATH);
        if !self.client().put_text(&pom, HOSTED_POM_CONTENT).await.success {
            return Err(HarnessError::Provision {
                store: self.provisioner.key("hosted", self.name),
                step: "upload merge pom",
            });
        }

        self.provisioner.create_remote(self.name).await?;
        self.settle().await;
        self.require_present("remote content", &self.content("remote", REMOTE_POM_PATH))
            .await?;

        let [initial, updated] = self.provisioner.group_phases(self.name, additional_repos);
        self.provisioner
            .put_group(self.name, &initial, "create group")
            .await?;
        self.provisioner
            .put_group(self.name, &updated, "add remote to group")
            .await?;
        self.settle().await;
        self.require_present("group merged path", &self.content("group", REMOTE_POM_PATH))
            .await?;
        self.require_metadata("merged remote version", REMOTE_VERSION_TAG, true)
            .await
    }

    async fn teardown(&self, hosted: &[String]) -> HarnessResult<()> {
        self.teardown_hosted(hosted).await?;
        self.teardown_remote().await?;
        self.provisioner.delete_store("group", self.name).await;
        Ok(())
    }

    async fn teardown_hosted(&self, hosted: &[String]) -> HarnessResult<()> {
        self.require_store("hosted", "hosted definition").await?;
        for path in hosted {
            self.require_present("hosted content", &self.content("hosted", path))
                .await?;
            self.require_present("group merged path", &self.content("group", path))
                .await?;
        }
        self.require_metadata("merged hosted version", LATEST_HOSTED_VERSION_TAG, true)
            .await?;

        self.provisioner.delete_store("hosted", self.name).await;
        self.provisioner.create_hosted(self.name).await?;
        self.require_store("hosted", "recreated hosted definition")
            .await?;
        self.settle().await;
        for path in hosted {
            self.require_absent("hosted content removal", &self.content("hosted", path))
                .await?;
        }
        self.provisioner.delete_store("hosted", self.name).await;
        self.settle().await;

        self.require_removed_from_group("hosted").await?;
        for path in hosted {
            self.require_absent("group merged path removal", &self.content("group", path))
                .await?;
        }
        self.require_metadata("hosted version removal", LATEST_HOSTED_VERSION_TAG, false)
            .await
    }

    async fn teardown_remote(&self) -> HarnessResult<()> {
        self.require_store("remote", "remote definition").await?;
        let missing = self
            .client()
            .get(&self.content("remote", MISSING_CONTENT_PATH))
            .await;
        let nfc_checked = missing.status == 404;
        if nfc_checked && !self.provisioner.is_nfc_cached("remote", self.name).await {
            return Err(HarnessError::verification(
                "remote nfc population",
                self.provisioner.key("remote", self.name),
            ));
        }

        self.provisioner.delete_store("remote", self.name).await;
        self.settle().await;
        if nfc_checked && self.provisioner.is_nfc_cached("remote", self.name).await {
            return Err(HarnessError::verification(
                "remote nfc clearing",
                self.provisioner.key("remote", self.name),
            ));
        }

        self.require_removed_from_group("remote").await?;
        self.require_absent("group remote path removal", &self.content("group", REMOTE_POM_PATH))
            .await?;
        self.require_absent(
            "merged metadata removal",
            &self.content("group", MERGED_MAVEN_METADATA_PATH),
        )
        .await
    }
}
