//! End-to-end integration run over a collected dataset.
//!
//! # Design
//! - The dataset repository is cloned (or updated) first; everything after
//!   works on the checkout so the flow is testable with a local directory.
//! - Once replay starts, the session repositories and tracking record are
//!   always cleaned up, whatever the outcome of later steps.
//! - Metadata checks compare the presence of `redhat-<suffix>` in every
//!   affected `maven-metadata.xml` before promotion, after promotion and after
//!   rollback.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indy_harness_config::{CacheLayout, PackageType};
use tracing::{info, warn};
use url::Url;

use crate::datest::lookup_all;
use crate::dataset::{
    ADDITIONAL_REPOS_JSON, DA_JSON, INFO_JSON, TRACKING_JSON, load_additional_repos, load_info,
    load_metadata_paths,
};
use crate::error::{HarnessError, HarnessResult};
use crate::files::{file_exists, prepare_dir};
use crate::folo::{delete_record, load_record, verify_record};
use crate::git::fetch_repo;
use crate::http::IndyClient;
use crate::model::{BuildMetadata, BuildName, TrackedContent};
use crate::promote::{PromoteOptions, promote_build, promotion_stores, rollback};
use crate::provision::Provisioner;
use crate::replay::{ReplayOptions, ReplayReport, run_replay};
use crate::rewrite::rule_for;
use crate::server::{IndyServer, validate_server};

/// Default concurrent workers for lookups and transfers.
pub const DEFAULT_ROUTINES: usize = 4;
/// Wait for the server to process promotion events.
pub const DEFAULT_PROMOTION_SETTLE: Duration = Duration::from_secs(30);
/// How long a finished run stays alive when asked to.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30 * 60);

const BEFORE_PROMOTE: &str = "before-promote";
const AFTER_PROMOTE: &str = "after-promote";
const AFTER_ROLLBACK: &str = "rollback";
const MAVEN_METADATA_XML: &str = "maven-metadata.xml";

/// Inputs of one integration run.
#[derive(Debug, Clone)]
pub struct IntegrationOptions {
    /// Server under test.
    pub target: String,
    /// Git URL of the dataset repository.
    pub dataset_repo: String,
    /// Dataset entry, e.g. `2836` or `2836/builds/AMJMVSDA5EAAE`.
    pub build_id: String,
    /// Concurrent workers for lookups and transfers.
    pub workers: usize,
    /// Hosted repository promoted into; `pnc-builds` when absent.
    pub promote_target: Option<String>,
    /// Repository whose metadata is checked: a group name or a full store key.
    pub meta_check_repo: Option<String>,
    /// Discard cached upload content before the replay.
    pub clear_cache: bool,
    /// Log mutating calls instead of sending them.
    pub dry_run: bool,
    /// Stay alive after the checks for debugging.
    pub keep_alive: bool,
    /// Wait after promotion and rollback.
    pub settle_delay: Duration,
    /// Duration of the keep-alive pause.
    pub keep_alive_delay: Duration,
    /// Directory the dataset repository is cloned into.
    pub workspace: PathBuf,
    /// Local cache directories.
    pub cache: CacheLayout,
    /// Session name; generated when absent.
    pub build_name: Option<BuildName>,
}

impl IntegrationOptions {
    /// Defaults for a run of `build_id` from `dataset_repo` against `target`.
    #[must_use]
    pub fn new(
        target: impl Into<String>,
        dataset_repo: impl Into<String>,
        build_id: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            dataset_repo: dataset_repo.into(),
            build_id: build_id.into(),
            workers: DEFAULT_ROUTINES,
            promote_target: None,
            meta_check_repo: None,
            clear_cache: false,
            dry_run: false,
            keep_alive: false,
            settle_delay: DEFAULT_PROMOTION_SETTLE,
            keep_alive_delay: DEFAULT_KEEP_ALIVE,
            workspace: std::env::temp_dir(),
            cache: CacheLayout::default(),
            build_name: None,
        }
    }
}

/// Summary of a completed integration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationReport {
    /// Replay phase result.
    pub replay: ReplayReport,
    /// Metadata files checked around promotion.
    pub metadata_files: Vec<String>,
    /// Whether the repositories and tracking record were removed.
    pub cleaned_up: bool,
}

/// Repository whose metadata is inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaCheckRepo {
    /// Store type, `group` unless a full key was given.
    pub kind: String,
    /// Store name.
    pub name: String,
}

impl MetaCheckRepo {
    /// Parse a group name or a `pkg:type:name` key; empty input disables the
    /// check.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let parts: Vec<&str> = raw.split(':').collect();
        match parts.as_slice() {
            [_, kind, name, ..] if !raw.starts_with(':') => Some(Self {
                kind: (*kind).to_string(),
                name: (*name).to_string(),
            }),
            _ => Some(Self {
                kind: "group".to_string(),
                name: raw.to_string(),
            }),
        }
    }
}

/// `scheme://host[:port]` of the server a record was captured on.
///
/// # Errors
///
/// Returns [`HarnessError::InvalidServer`] when `local_url` is not a URL
/// with a host.
pub fn original_base(local_url: &str) -> HarnessResult<String> {
    let invalid = |reason: &str| HarnessError::InvalidServer {
        address: local_url.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(local_url).map_err(|err| invalid(&err.to_string()))?;
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    Ok(url.port().map_or_else(
        || format!("{}://{host}", url.scheme()),
        |port| format!("{}://{host}:{port}", url.scheme()),
    ))
}

/// `maven-metadata.xml` paths affected by promoting the POM uploads.
#[must_use]
pub fn metadata_files(record: &TrackedContent) -> Vec<String> {
    record
        .uploads
        .iter()
        .filter(|entry| entry.path.ends_with(".pom"))
        .filter_map(|entry| {
            let (version_dir, _) = entry.path.rsplit_once('/')?;
            let (artifact_dir, _) = version_dir.rsplit_once('/')?;
            Some(format!("{artifact_dir}/{MAVEN_METADATA_XML}"))
        })
        .collect()
}

/// Download `files` from `repo` into `dir` and check that `redhat-<version>`
/// is present (or absent) in each.
///
/// # Errors
///
/// Returns [`HarnessError::Verification`] listing every file that is missing
/// or does not match the expectation.
pub async fn check_metadata(
    provisioner: &Provisioner,
    repo: &MetaCheckRepo,
    files: &[String],
    dir: &Path,
    version: &str,
    expect_present: bool,
) -> HarnessResult<()> {
    let marker = format!("redhat-{version}");
    let mut failures = Vec::new();
    for file in files {
        let relative = file.trim_start_matches('/');
        let dest = dir.join(relative);
        let url = provisioner.content_url(&repo.kind, &repo.name, relative);
        if !provisioner.client().download(&url, &dest).await || !file_exists(&dest).await {
            warn!(url, "metadata file not available");
            failures.push(file.clone());
            continue;
        }
        let content = tokio::fs::read_to_string(&dest)
            .await
            .map_err(|source| HarnessError::io("read metadata", &dest, source))?;
        let present = content.contains(&marker);
        info!(file = %file, marker = %marker, present, expect_present, "checked metadata");
        if present != expect_present {
            failures.push(file.clone());
        }
    }
    if failures.is_empty() {
        return Ok(());
    }
    let check = if expect_present {
        "metadata lists promoted version"
    } else {
        "metadata omits promoted version"
    };
    Err(HarnessError::verification(check, failures.join(",")))
}

/// Clone the dataset repository and run the integration steps.
///
/// # Errors
///
/// See [`run_checkout`]; clone failures are [`HarnessError::Git`].
pub async fn run_integration(
    client: &IndyClient,
    options: &IntegrationOptions,
) -> HarnessResult<IntegrationReport> {
    let checkout = fetch_repo(&options.dataset_repo, &options.workspace).await?;
    run_checkout(client, &checkout, options).await
}

/// Run the integration steps against an existing dataset checkout.
///
/// # Errors
///
/// Returns the first failing step: dataset loading, server validation,
/// replay, record verification, a metadata check, promotion or rollback.
pub async fn run_checkout(
    client: &IndyClient,
    checkout: &Path,
    options: &IntegrationOptions,
) -> HarnessResult<IntegrationReport> {
    let entry = checkout.join(&options.build_id);
    let group_id = options.build_id.split('/').next().unwrap_or(&options.build_id);
    let info = load_info(&checkout.join(group_id).join(INFO_JSON)).await?;
    let additional_repos = load_additional_repos(&entry.join(ADDITIONAL_REPOS_JSON)).await?;
    let package_type = info.package_type();
    let target = validate_server(client, &options.target).await?;
    let provisioner = Provisioner::new(
        client.clone(),
        &target.base_url,
        BuildMetadata::for_package(package_type),
    );
    info!(
        build_id = %options.build_id,
        package = %package_type,
        target = %target.base_url,
        "starting integration run"
    );

    let lookups: Vec<String> = load_metadata_paths(&entry.join(DA_JSON))
        .await?
        .iter()
        .map(|path| provisioner.content_url("group", info.da_group(), path))
        .collect();
    let outcome = lookup_all(client, lookups, options.workers).await?;
    info!(
        attempted = outcome.attempted,
        failed = outcome.failed,
        group = info.da_group(),
        "alignment metadata retrieved"
    );

    let record = load_record(&entry.join(TRACKING_JSON)).await?;
    let first = record.uploads.first().ok_or_else(|| HarnessError::InvalidRecord {
        id: record.tracking_key.id.clone(),
        reason: "no uploads",
    })?;
    let original = original_base(&first.local_url)?;
    let build = options.build_name.clone().unwrap_or_else(BuildName::generate);

    let session = Session {
        client,
        provisioner: &provisioner,
        target: &target,
        options,
        package_type,
        record: &record,
        build: &build,
    };
    let result = session.run(original, additional_repos).await;
    let cleaned_up = session.clean_up().await;
    result.map(|(replay, metadata_files)| IntegrationReport {
        replay,
        metadata_files,
        cleaned_up,
    })
}

struct Session<'a> {
    client: &'a IndyClient,
    provisioner: &'a Provisioner,
    target: &'a IndyServer,
    options: &'a IntegrationOptions,
    package_type: PackageType,
    record: &'a TrackedContent,
    build: &'a BuildName,
}

impl Session<'_> {
    async fn run(
        &self,
        original: String,
        additional_repos: Vec<String>,
    ) -> HarnessResult<(ReplayReport, Vec<String>)> {
        let options = self.options;
        let mut replay = ReplayOptions::new(original, options.target.clone(), self.package_type);
        replay.workers = options.workers;
        replay.clear_cache = options.clear_cache;
        replay.dry_run = options.dry_run;
        replay.additional_repos = additional_repos;
        replay.build_name = Some(self.build.clone());
        replay.cache = options.cache.clone();
        let report = run_replay(self.client, self.record, &replay).await?;

        let rule = rule_for(self.package_type);
        if !options.dry_run {
            let mismatches =
                verify_record(self.client, &self.target.base_url, self.build, self.record, rule)
                    .await?;
            if !mismatches.is_empty() {
                return Err(HarnessError::verification(
                    "tracking record matches original",
                    self.build.as_str(),
                ));
            }
        }

        let files = metadata_files(self.record);
        self.check_metadata(&files, BEFORE_PROMOTE, false).await?;

        let (source, target_store) = promotion_stores(
            self.package_type,
            self.build,
            options.promote_target.as_deref(),
            self.record,
        )?;
        let promotion = promote_build(
            self.client,
            &self.target.base_url,
            self.record,
            PromoteOptions {
                source: Some(source),
                target: target_store,
                new_version: Some(self.build.version_suffix().to_string()),
                dry_run: options.dry_run,
            },
            rule,
        )
        .await?;
        if !promotion.success {
            return Err(HarnessError::verification("promotion accepted", promotion.body));
        }
        self.settle().await;
        self.check_metadata(&files, AFTER_PROMOTE, true).await?;

        let rolled_back = rollback(
            self.client,
            &self.target.base_url,
            &promotion.body,
            options.dry_run,
        )
        .await;
        if !rolled_back.success {
            return Err(HarnessError::verification("rollback accepted", rolled_back.body));
        }
        self.settle().await;
        self.check_metadata(&files, AFTER_ROLLBACK, false).await?;

        if options.keep_alive {
            info!(delay_s = options.keep_alive_delay.as_secs(), "keeping the run alive");
            tokio::time::sleep(options.keep_alive_delay).await;
        }
        Ok((report, files))
    }

    async fn settle(&self) {
        info!(delay_s = self.options.settle_delay.as_secs(), "waiting for promotion events");
        tokio::time::sleep(self.options.settle_delay).await;
    }

    async fn check_metadata(
        &self,
        files: &[String],
        stage: &str,
        expect_present: bool,
    ) -> HarnessResult<()> {
        let Some(repo) = self
            .options
            .meta_check_repo
            .as_deref()
            .and_then(MetaCheckRepo::parse)
        else {
            info!(stage, "no metadata check repository, skipping metadata check");
            return Ok(());
        };
        if self.options.dry_run {
            info!(stage, "dry run: skipping metadata check");
            return Ok(());
        }
        let dir = self.options.cache.metadata_dir.join(stage);
        prepare_dir(&dir, true).await?;
        check_metadata(
            self.provisioner,
            &repo,
            files,
            &dir,
            self.build.version_suffix(),
            expect_present,
        )
        .await?;
        info!(stage, files = files.len(), "metadata check passed");
        Ok(())
    }

    async fn clean_up(&self) -> bool {
        if self.options.dry_run {
            info!(build = %self.build, "dry run: skipping clean up");
            return false;
        }
        let repos = self.provisioner.delete_all(self.build.as_str()).await;
        let record = delete_record(self.client, &self.target.base_url, self.build.as_str()).await;
        repos && record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TrackedContentEntry, TrackingKey};
    use httpmock::prelude::*;
    use std::error::Error;
    use tempfile::TempDir;

    const CONTENT: &str = "hello world";
    const CONTENT_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
    const BUILD: &str = "build-test-94465";
    const ORIGINAL_PATH: &str =
        "/api/content/maven/hosted/build-1234/org/x/y/1.0.redhat-00001/y-1.0.redhat-00001.jar";
    const UPLOAD_PATH: &str = concat!(
        "/api/folo/track/build-test-94465/maven/hosted/build-test-94465",
        "/org/x/y/1.0.redhat-94465/y-1.0.redhat-94465.jar",
    );
    const RECORD_PATH: &str = "/api/folo/admin/build-test-94465/record";

    fn client() -> IndyClient {
        IndyClient::new(Duration::from_secs(5), None).expect("client")
    }

    fn upload(path: &str, local_url: &str) -> TrackedContentEntry {
        TrackedContentEntry {
            path: path.to_string(),
            store_key: "maven:hosted:build-1234".to_string(),
            local_url: local_url.to_string(),
            md5: CONTENT_MD5.to_string(),
            ..TrackedContentEntry::default()
        }
    }

    fn accept_validation(server: &MockServer) {
        server.mock(|when, then| {
            when.method(GET).path("/api/admin/stores/maven/remote/central");
            then.status(200).body("{}");
        });
    }

    async fn write_dataset(root: &Path, original: &MockServer) -> Result<(), Box<dyn Error>> {
        let dir = root.join("100");
        tokio::fs::create_dir_all(&dir).await?;
        let info = r#"{"pncBaseUrl":"http://pnc","buildId":"100","buildType":"MVN",
            "temporaryBuild":false}"#;
        tokio::fs::write(dir.join(INFO_JSON), info).await?;
        tokio::fs::write(dir.join(DA_JSON), r#"["org/x/y/maven-metadata.xml"]"#).await?;
        let record = TrackedContent {
            tracking_key: TrackingKey { id: "build-1234".into() },
            uploads: vec![upload(
                "/org/x/y/1.0.redhat-00001/y-1.0.redhat-00001.jar",
                &original.url(ORIGINAL_PATH),
            )],
            downloads: Vec::new(),
        };
        tokio::fs::write(dir.join(TRACKING_JSON), serde_json::to_vec(&record)?).await?;
        Ok(())
    }

    fn options(target: &MockServer, cache: &TempDir) -> IntegrationOptions {
        let mut options = IntegrationOptions::new(target.base_url(), "unused", "100");
        options.build_name = BuildName::parse(BUILD);
        options.cache = CacheLayout::rooted(cache.path());
        options.settle_delay = Duration::ZERO;
        options
    }

    #[test]
    fn original_base_keeps_scheme_host_and_port() -> Result<(), Box<dyn Error>> {
        assert_eq!(
            original_base("http://indy.example.com/api/content/maven/hosted/x/a.jar")?,
            "http://indy.example.com"
        );
        assert_eq!(original_base("https://indy:8443/api/x")?, "https://indy:8443");
        assert!(original_base("not a url").is_err());
        Ok(())
    }

    #[test]
    fn metadata_files_come_from_pom_uploads() {
        let record = TrackedContent {
            uploads: vec![
                upload("/org/x/y/1.0.redhat-1/y-1.0.redhat-1.pom", ""),
                upload("/org/x/y/1.0.redhat-1/y-1.0.redhat-1.jar", ""),
            ],
            ..TrackedContent::default()
        };
        assert_eq!(metadata_files(&record), vec!["/org/x/y/maven-metadata.xml".to_string()]);
    }

    #[test]
    fn meta_check_repo_accepts_names_and_keys() {
        assert_eq!(MetaCheckRepo::parse(""), None);
        assert_eq!(
            MetaCheckRepo::parse("test-builds"),
            Some(MetaCheckRepo { kind: "group".into(), name: "test-builds".into() })
        );
        assert_eq!(
            MetaCheckRepo::parse("maven:hosted:pnc-builds"),
            Some(MetaCheckRepo { kind: "hosted".into(), name: "pnc-builds".into() })
        );
    }

    #[tokio::test]
    async fn metadata_check_reports_unexpected_versions() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        let dir = TempDir::new()?;
        server.mock(|when, then| {
            when.method(GET).path("/api/content/maven/group/builds/org/x/y/maven-metadata.xml");
            then.status(200).body("<versions><version>1.0.redhat-94465</version></versions>");
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/content/maven/group/builds/org/x/z/maven-metadata.xml");
            then.status(404);
        });
        let provisioner = Provisioner::new(
            client(),
            &server.base_url(),
            BuildMetadata::for_package(PackageType::Maven),
        );
        let repo = MetaCheckRepo { kind: "group".into(), name: "builds".into() };
        let present = vec!["/org/x/y/maven-metadata.xml".to_string()];

        check_metadata(&provisioner, &repo, &present, dir.path(), "94465", true).await?;
        let err = check_metadata(&provisioner, &repo, &present, dir.path(), "94465", false)
            .await
            .expect_err("version present");
        assert!(matches!(err, HarnessError::Verification { .. }));

        let missing = vec!["/org/x/z/maven-metadata.xml".to_string()];
        let err = check_metadata(&provisioner, &repo, &missing, dir.path(), "94465", false)
            .await
            .expect_err("missing file");
        assert!(matches!(
            err,
            HarnessError::Verification { subject, .. } if subject.contains("org/x/z")
        ));
        Ok(())
    }

    #[tokio::test]
    async fn full_run_promotes_rolls_back_and_cleans_up() -> Result<(), Box<dyn Error>> {
        let original = MockServer::start_async().await;
        let target = MockServer::start_async().await;
        let checkout = TempDir::new()?;
        let cache = TempDir::new()?;
        write_dataset(checkout.path(), &original).await?;
        accept_validation(&original);
        accept_validation(&target);
        let da = target.mock(|when, then| {
            when.method(GET).path("/api/content/maven/group/DA/org/x/y/maven-metadata.xml");
            then.status(200).body("<metadata/>");
        });
        target.mock(|when, then| {
            when.method(PUT).path_prefix("/api/admin/stores/maven/");
            then.status(201);
        });
        original.mock(|when, then| {
            when.method(GET).path(ORIGINAL_PATH);
            then.status(200).body(CONTENT);
        });
        let uploaded = target.mock(|when, then| {
            when.method(PUT).path(UPLOAD_PATH).body(CONTENT);
            then.status(201);
        });
        target.mock(|when, then| {
            when.method(POST).path(RECORD_PATH);
            then.status(200);
        });
        target.mock(|when, then| {
            when.method(GET).path(RECORD_PATH);
            then.status(200).json_body(serde_json::json!({
                "key": {"id": BUILD},
                "uploads": [{
                    "path": "/org/x/y/1.0.redhat-94465/y-1.0.redhat-94465.jar",
                    "storeKey": "maven:hosted:build-test-94465",
                    "md5": CONTENT_MD5
                }]
            }));
        });
        let promote = target.mock(|when, then| {
            when.method(POST)
                .path("/api/promotion/paths/promote")
                .body_includes("maven:hosted:pnc-builds");
            then.status(200).body("receipt");
        });
        let rollback = target.mock(|when, then| {
            when.method(POST).path("/api/promotion/paths/rollback").body("receipt");
            then.status(200);
        });
        let deletes = target.mock(|when, then| {
            when.method(DELETE).path_prefix("/api/admin/stores/maven/");
            then.status(204);
        });
        let record_deleted = target.mock(|when, then| {
            when.method(DELETE).path(RECORD_PATH);
            then.status(204);
        });

        let report = run_checkout(&client(), checkout.path(), &options(&target, &cache)).await?;

        assert_eq!(report.replay.build_name.as_str(), BUILD);
        assert!(report.metadata_files.is_empty());
        assert!(report.cleaned_up);
        da.assert();
        uploaded.assert();
        promote.assert();
        rollback.assert();
        deletes.assert_calls(3);
        record_deleted.assert();
        Ok(())
    }

    #[tokio::test]
    async fn failed_promotion_still_cleans_up() -> Result<(), Box<dyn Error>> {
        let original = MockServer::start_async().await;
        let target = MockServer::start_async().await;
        let checkout = TempDir::new()?;
        let cache = TempDir::new()?;
        write_dataset(checkout.path(), &original).await?;
        accept_validation(&original);
        accept_validation(&target);
        target.mock(|when, then| {
            when.method(GET).path("/api/content/maven/group/DA/org/x/y/maven-metadata.xml");
            then.status(200).body("<metadata/>");
        });
        target.mock(|when, then| {
            when.method(PUT).path_prefix("/api/admin/stores/maven/");
            then.status(201);
        });
        original.mock(|when, then| {
            when.method(GET).path(ORIGINAL_PATH);
            then.status(200).body(CONTENT);
        });
        target.mock(|when, then| {
            when.method(PUT).path(UPLOAD_PATH);
            then.status(201);
        });
        target.mock(|when, then| {
            when.method(POST).path(RECORD_PATH);
            then.status(200);
        });
        target.mock(|when, then| {
            when.method(GET).path(RECORD_PATH);
            then.status(200).json_body(serde_json::json!({
                "key": {"id": BUILD},
                "uploads": [{
                    "path": "/org/x/y/1.0.redhat-94465/y-1.0.redhat-94465.jar",
                    "md5": CONTENT_MD5
                }]
            }));
        });
        target.mock(|when, then| {
            when.method(POST).path("/api/promotion/paths/promote");
            then.status(409).body("conflict");
        });
        let rollback = target.mock(|when, then| {
            when.method(POST).path("/api/promotion/paths/rollback");
            then.status(200);
        });
        let deletes = target.mock(|when, then| {
            when.method(DELETE).path_prefix("/api/admin/stores/maven/");
            then.status(204);
        });
        let record_deleted = target.mock(|when, then| {
            when.method(DELETE).path(RECORD_PATH);
            then.status(204);
        });

        let err = run_checkout(&client(), checkout.path(), &options(&target, &cache))
            .await
            .expect_err("promotion rejected");

        assert!(matches!(err, HarnessError::Verification { check: "promotion accepted", .. }));
        rollback.assert_calls(0);
        deletes.assert_calls(3);
        record_deleted.assert();
        Ok(())
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() -> Result<(), Box<dyn Error>> {
        let original = MockServer::start_async().await;
        let target = MockServer::start_async().await;
        let checkout = TempDir::new()?;
        let cache = TempDir::new()?;
        write_dataset(checkout.path(), &original).await?;
        accept_validation(&original);
        accept_validation(&target);
        target.mock(|when, then| {
            when.method(GET).path("/api/content/maven/group/DA/org/x/y/maven-metadata.xml");
            then.status(200).body("<metadata/>");
        });
        let promote = target.mock(|when, then| {
            when.method(POST)
                .path("/api/promotion/paths/promote")
                .body_includes("\"dryRun\": true");
            then.status(200).body("{}");
        });
        let mutations = target.mock(|when, then| {
            when.method(DELETE);
            then.status(204);
        });
        let mut options = options(&target, &cache);
        options.dry_run = true;
        options.meta_check_repo = Some("builds".into());

        let report = run_checkout(&client(), checkout.path(), &options).await?;

        assert!(!report.cleaned_up);
        assert!(!report.replay.sealed);
        promote.assert();
        mutations.assert_calls(0);
        Ok(())
    }
}
