//! Build replay: provision a session namespace, replay recorded downloads and
//! uploads into it, then seal the session's tracking record.
//!
//! # Design
//! - Server validation and provisioning failures abort before any transfer.
//! - A failed transfer batch aborts the run; a checksum mismatch aborts the
//!   batch it occurs in.
//! - Sealing is housekeeping: failure is a warning.
//! - Dry run still validates servers and builds every job, but replaces each
//!   mutating call with a log event.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use indy_harness_config::{CacheLayout, PackageType};
use tracing::{debug, info};

use crate::batch::{BatchOutcome, BatchPolicy, run_batch};
use crate::error::HarnessResult;
use crate::files::{file_exists, md5_check, prepare_dir};
use crate::folo::seal_record;
use crate::http::IndyClient;
use crate::model::{BuildMetadata, BuildName, TrackedContent};
use crate::provision::Provisioner;
use crate::rewrite::{TransferJob, download_jobs, rule_for, upload_jobs};
use crate::server::validate_server;

/// Inputs of one replay run.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Server the record was captured on.
    pub original: String,
    /// Server the build is replayed against.
    pub target: String,
    /// Package type of the session repositories.
    pub package_type: PackageType,
    /// Concurrent transfer workers.
    pub workers: usize,
    /// Overrides the worker-count derived failure policy.
    pub fail_fast: Option<bool>,
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
}

impl ReplayOptions {
    /// Sequential, non-dry-run replay with the default cache layout.
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
            fail_fast: None,
            clear_cache: false,
            dry_run: false,
            additional_repos: Vec::new(),
            build_name: None,
            cache: CacheLayout::default(),
        }
    }

    /// Batch policy for the transfer phases.
    #[must_use]
    pub fn policy(&self) -> BatchPolicy {
        let policy = BatchPolicy::for_workers(self.workers);
        self.fail_fast
            .map_or(policy, |fail_fast| policy.with_fail_fast(fail_fast))
    }
}

/// Summary of a completed replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Session name used for repositories and tracking.
    pub build_name: BuildName,
    /// Download phase result.
    pub downloads: BatchOutcome,
    /// Upload phase result.
    pub uploads: BatchOutcome,
    /// Whether the session record was sealed.
    pub sealed: bool,
}

pub(crate) struct TransferContext {
    pub(crate) client: IndyClient,
    pub(crate) download_dir: PathBuf,
    pub(crate) upload_dir: PathBuf,
    pub(crate) dry_run: bool,
}

/// Replay `record` against the target server.
///
/// # Errors
///
/// Returns an error when a server is invalid, provisioning fails, a cache
/// directory cannot be prepared, a checksum does not match, or a transfer
/// batch reports failures.
pub async fn run_replay(
    client: &IndyClient,
    record: &TrackedContent,
    options: &ReplayOptions,
) -> HarnessResult<ReplayReport> {
    let original = validate_server(client, &options.original).await?;
    let target = validate_server(client, &options.target).await?;
    let build = options.build_name.clone().unwrap_or_else(BuildName::generate);
    info!(
        build = %build,
        record = %record.tracking_key.id,
        original = %original.base_url,
        target = %target.base_url,
        workers = options.workers,
        dry_run = options.dry_run,
        "starting build replay"
    );

    let provisioner = Provisioner::new(
        client.clone(),
        &target.base_url,
        BuildMetadata::for_package(options.package_type),
    );
    if options.dry_run {
        info!(build = %build, "dry run: skipping repository provisioning");
    } else {
        provisioner
            .provision(build.as_str(), &options.additional_repos)
            .await?;
    }

    let upload_dir = options.cache.upload_dir(&record.tracking_key.id);
    prepare_dir(&options.cache.download_dir, false).await?;
    prepare_dir(&upload_dir, options.clear_cache).await?;
    let context = Arc::new(TransferContext {
        client: client.clone(),
        download_dir: options.cache.download_dir.clone(),
        upload_dir,
        dry_run: options.dry_run,
    });
    let policy = options.policy();

    let downloads = download_jobs(
        &target.base_url,
        &build,
        options.package_type,
        record,
        &options.additional_repos,
    );
    let downloads = run_transfers("downloads", policy, downloads, &context, download_one).await?;

    let uploads = upload_jobs(
        &original.base_url,
        &target.base_url,
        &build,
        record,
        rule_for(options.package_type),
    );
    let uploads = run_transfers("uploads", policy, uploads, &context, upload_one).await?;

    let sealed = if options.dry_run {
        info!(build = %build, "dry run: skipping tracking record sealing");
        false
    } else {
        seal_record(client, &target.base_url, build.as_str()).await
    };

    info!(build = %build, sealed, "build replay finished");
    Ok(ReplayReport {
        build_name: build,
        downloads,
        uploads,
        sealed,
    })
}

pub(crate) async fn run_transfers<F, Fut>(
    batch: &'static str,
    policy: BatchPolicy,
    jobs: Vec<TransferJob>,
    context: &Arc<TransferContext>,
    transfer: F,
) -> HarnessResult<BatchOutcome>
where
    F: Fn(Arc<TransferContext>, TransferJob) -> Fut + Copy + Send + Sync + 'static,
    Fut: Future<Output = HarnessResult<bool>> + Send + 'static,
{
    if jobs.is_empty() {
        debug!(batch, "nothing to transfer");
        return Ok(BatchOutcome::default());
    }
    info!(batch, jobs = jobs.len(), workers = policy.workers, "starting transfers");
    let context = Arc::clone(context);
    let outcome = run_batch(policy, jobs, move |job| transfer(Arc::clone(&context), job))
        .await?
        .require_success(batch)?;
    info!(batch, attempted = outcome.attempted, "transfers finished");
    Ok(outcome)
}

async fn download_one(context: Arc<TransferContext>, job: TransferJob) -> HarnessResult<bool> {
    if context.dry_run {
        info!(url = %job.target_url, "dry run: skipping download");
        return Ok(true);
    }
    let dest = context.download_dir.join(job.cache_path());
    if !context.client.download(&job.target_url, &dest).await {
        return Ok(false);
    }
    md5_check(&dest, &job.checksum).await?;
    Ok(true)
}

pub(crate) async fn upload_one(
    context: Arc<TransferContext>,
    job: TransferJob,
) -> HarnessResult<bool> {
    let Some(original_url) = job.original_url.as_deref() else {
        return Ok(false);
    };
    if context.dry_run {
        info!(original = %original_url, target = %job.target_url, "dry run: skipping upload");
        return Ok(true);
    }
    let cached = context.upload_dir.join(job.cache_path());
    if file_exists(&cached).await {
        debug!(path = %cached.display(), "reusing cached upload content");
    } else if !context.client.download(original_url, &cached).await {
        return Ok(false);
    }
    md5_check(&cached, &job.checksum).await?;
    Ok(context.client.upload(&job.target_url, &cached).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;
    use crate::model::{TrackedContentEntry, TrackingKey};
    use httpmock::prelude::*;
    use std::error::Error;
    use std::time::Duration;
    use tempfile::TempDir;

    const CONTENT: &str = "hello world";
    const CONTENT_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
    const BUILD: &str = "build-test-94465";
    const DOWNLOAD_PATH: &str =
        "/api/folo/track/build-test-94465/maven/group/build-test-94465/org/x/y/1.0/y-1.0.jar";
    const ORIGINAL_PATH: &str =
        "/api/content/maven/hosted/build-1234/org/x/y/1.0/y-1.0.redhat-00001.jar";
    const UPLOAD_PATH: &str = concat!(
        "/api/folo/track/build-test-94465/maven/hosted/build-test-94465",
        "/org/x/y/1.0/y-1.0.redhat-94465.jar",
    );
    const SEAL_PATH: &str = "/api/folo/admin/build-test-94465/record";

    fn client() -> IndyClient {
        IndyClient::new(Duration::from_secs(5), None).expect("client")
    }

    fn record(upload_md5: &str) -> TrackedContent {
        TrackedContent {
            tracking_key: TrackingKey { id: "build-1234".into() },
            downloads: vec![TrackedContentEntry {
                access_channel: "NATIVE".into(),
                path: "/org/x/y/1.0/y-1.0.jar".into(),
                store_key: "maven:remote:central".into(),
                md5: CONTENT_MD5.into(),
                ..TrackedContentEntry::default()
            }],
            uploads: vec![TrackedContentEntry {
                access_channel: "NATIVE".into(),
                path: "/org/x/y/1.0/y-1.0.redhat-00001.jar".into(),
                store_key: "maven:hosted:build-1234".into(),
                md5: upload_md5.into(),
                ..TrackedContentEntry::default()
            }],
        }
    }

    fn accept_validation(server: &MockServer) {
        server.mock(|when, then| {
            when.method(GET).path("/api/admin/stores/maven/remote/central");
            then.status(200).body("{}");
        });
    }

    fn stores(server: &MockServer) -> Vec<httpmock::Mock<'_>> {
        ["hosted", "remote", "group"]
            .iter()
            .map(|kind| {
                let path = format!("/api/admin/stores/maven/{kind}/{BUILD}");
                server.mock(move |when, then| {
                    when.method(PUT).path(path);
                    then.status(201);
                })
            })
            .collect()
    }

    fn options(original: &MockServer, target: &MockServer, cache: &TempDir) -> ReplayOptions {
        let mut options =
            ReplayOptions::new(original.base_url(), target.base_url(), PackageType::Maven);
        options.build_name = BuildName::parse(BUILD);
        options.cache = CacheLayout::rooted(cache.path());
        options
    }

    #[tokio::test]
    async fn replays_downloads_and_uploads_then_seals() -> Result<(), Box<dyn Error>> {
        let original = MockServer::start_async().await;
        let target = MockServer::start_async().await;
        let cache = TempDir::new()?;
        accept_validation(&original);
        accept_validation(&target);
        let store_mocks = stores(&target);
        let download = target.mock(|when, then| {
            when.method(GET).path(DOWNLOAD_PATH);
            then.status(200).body(CONTENT);
        });
        let fetch = original.mock(|when, then| {
            when.method(GET).path(ORIGINAL_PATH);
            then.status(200).body(CONTENT);
        });
        let upload = target.mock(|when, then| {
            when.method(PUT).path(UPLOAD_PATH).body(CONTENT);
            then.status(201);
        });
        let seal = target.mock(|when, then| {
            when.method(POST).path(SEAL_PATH);
            then.status(200);
        });

        let options = options(&original, &target, &cache);
        let report = run_replay(&client(), &record(CONTENT_MD5), &options).await?;

        assert_eq!(report.build_name.as_str(), BUILD);
        assert_eq!(report.downloads, BatchOutcome { attempted: 1, failed: 0 });
        assert_eq!(report.uploads, BatchOutcome { attempted: 1, failed: 0 });
        assert!(report.sealed);
        store_mocks[0].assert();
        store_mocks[1].assert();
        store_mocks[2].assert_calls(2);
        download.assert();
        fetch.assert();
        upload.assert();
        seal.assert();
        assert!(cache.path().join("download/org/x/y/1.0/y-1.0.jar").exists());
        assert!(cache.path().join("upload/org/x/y/1.0/y-1.0.redhat-00001.jar").exists());
        Ok(())
    }

    #[tokio::test]
    async fn checksum_mismatch_aborts_before_upload() -> Result<(), Box<dyn Error>> {
        let original = MockServer::start_async().await;
        let target = MockServer::start_async().await;
        let cache = TempDir::new()?;
        accept_validation(&original);
        accept_validation(&target);
        stores(&target);
        target.mock(|when, then| {
            when.method(GET).path(DOWNLOAD_PATH);
            then.status(200).body(CONTENT);
        });
        original.mock(|when, then| {
            when.method(GET).path(ORIGINAL_PATH);
            then.status(200).body("tampered");
        });
        let upload = target.mock(|when, then| {
            when.method(PUT).path(UPLOAD_PATH);
            then.status(201);
        });
        let seal = target.mock(|when, then| {
            when.method(POST).path(SEAL_PATH);
            then.status(200);
        });

        let err = run_replay(&client(), &record(CONTENT_MD5), &options(&original, &target, &cache))
            .await
            .expect_err("mismatch");

        assert!(matches!(err, HarnessError::ChecksumMismatch { .. }));
        upload.assert_calls(0);
        seal.assert_calls(0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_download_stops_the_run() -> Result<(), Box<dyn Error>> {
        let original = MockServer::start_async().await;
        let target = MockServer::start_async().await;
        let cache = TempDir::new()?;
        accept_validation(&original);
        accept_validation(&target);
        stores(&target);
        target.mock(|when, then| {
            when.method(GET).path(DOWNLOAD_PATH);
            then.status(404);
        });
        let fetch = original.mock(|when, then| {
            when.method(GET).path(ORIGINAL_PATH);
            then.status(200).body(CONTENT);
        });

        let err = run_replay(&client(), &record(CONTENT_MD5), &options(&original, &target, &cache))
            .await
            .expect_err("download failure");

        assert!(matches!(
            err,
            HarnessError::BatchFailed { batch: "downloads", failed: 1, attempted: 1 }
        ));
        fetch.assert_calls(0);
        Ok(())
    }

    #[tokio::test]
    async fn cached_upload_content_is_reused() -> Result<(), Box<dyn Error>> {
        let original = MockServer::start_async().await;
        let target = MockServer::start_async().await;
        let cache = TempDir::new()?;
        accept_validation(&original);
        accept_validation(&target);
        stores(&target);
        target.mock(|when, then| {
            when.method(GET).path(DOWNLOAD_PATH);
            then.status(200).body(CONTENT);
        });
        let fetch = original.mock(|when, then| {
            when.method(GET).path(ORIGINAL_PATH);
            then.status(200).body(CONTENT);
        });
        let upload = target.mock(|when, then| {
            when.method(PUT).path(UPLOAD_PATH).body(CONTENT);
            then.status(201);
        });
        target.mock(|when, then| {
            when.method(POST).path(SEAL_PATH);
            then.status(500);
        });
        let cached = cache.path().join("upload/org/x/y/1.0/y-1.0.redhat-00001.jar");
        std::fs::create_dir_all(cached.parent().ok_or("cache parent")?)?;
        std::fs::write(&cached, CONTENT)?;

        let options = options(&original, &target, &cache);
        let report = run_replay(&client(), &record(CONTENT_MD5), &options).await?;

        fetch.assert_calls(0);
        upload.assert();
        assert!(!report.sealed);
        Ok(())
    }

    #[tokio::test]
    async fn same_named_uploads_keep_separate_cache_files() -> Result<(), Box<dyn Error>> {
        let original = MockServer::start_async().await;
        let target = MockServer::start_async().await;
        let cache = TempDir::new()?;
        accept_validation(&original);
        accept_validation(&target);
        stores(&target);
        target.mock(|when, then| {
            when.method(POST).path(SEAL_PATH);
            then.status(200);
        });
        const METADATA: &str = "maven-metadata.xml";
        let mut puts = Vec::new();
        for (dir, body) in [("a", "<metadata>A</metadata>"), ("b", "<metadata>B</metadata>")] {
            original.mock(|when, then| {
                when.method(GET).path(format!(
                    "/api/content/maven/hosted/build-1234/org/x/{dir}/{METADATA}"
                ));
                then.status(200).body(body);
            });
            puts.push(target.mock(|when, then| {
                when.method(PUT)
                    .path(format!(
                        "/api/folo/track/{BUILD}/maven/hosted/{BUILD}/org/x/{dir}/{METADATA}"
                    ))
                    .body(body);
                then.status(201);
            }));
        }
        let record = TrackedContent {
            tracking_key: TrackingKey { id: "build-1234".into() },
            downloads: Vec::new(),
            uploads: ["a", "b"]
                .iter()
                .map(|dir| TrackedContentEntry {
                    access_channel: "NATIVE".into(),
                    path: format!("/org/x/{dir}/maven-metadata.xml"),
                    store_key: "maven:hosted:build-1234".into(),
                    ..TrackedContentEntry::default()
                })
                .collect(),
        };

        let report = run_replay(&client(), &record, &options(&original, &target, &cache)).await?;

        assert_eq!(report.uploads, BatchOutcome { attempted: 2, failed: 0 });
        for put in &puts {
            put.assert();
        }
        assert!(cache.path().join("upload/org/x/a/maven-metadata.xml").is_file());
        assert!(cache.path().join("upload/org/x/b/maven-metadata.xml").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn dry_run_only_validates_servers() -> Result<(), Box<dyn Error>> {
        let original = MockServer::start_async().await;
        let target = MockServer::start_async().await;
        let cache = TempDir::new()?;
        accept_validation(&original);
        accept_validation(&target);
        let puts = target.mock(|when, then| {
            when.method(PUT);
            then.status(201);
        });
        let posts = target.mock(|when, then| {
            when.method(POST);
            then.status(200);
        });
        let fetch = original.mock(|when, then| {
            when.method(GET).path(ORIGINAL_PATH);
            then.status(200).body(CONTENT);
        });

        let mut options = options(&original, &target, &cache);
        options.dry_run = true;
        options.workers = 3;
        let report = run_replay(&client(), &record(CONTENT_MD5), &options).await?;

        assert_eq!(report.downloads.attempted, 1);
        assert_eq!(report.uploads.attempted, 1);
        assert!(!report.sealed);
        puts.assert_calls(0);
        posts.assert_calls(0);
        fetch.assert_calls(0);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_target_aborts_before_provisioning() -> Result<(), Box<dyn Error>> {
        let original = MockServer::start_async().await;
        let target = MockServer::start_async().await;
        let cache = TempDir::new()?;
        accept_validation(&original);
        target.mock(|when, then| {
            when.method(GET).path("/api/admin/stores/maven/remote/central");
            then.status(500);
        });
        let puts = target.mock(|when, then| {
            when.method(PUT);
            then.status(201);
        });

        let err = run_replay(&client(), &record(CONTENT_MD5), &options(&original, &target, &cache))
            .await
            .expect_err("invalid target");
        assert!(matches!(err, HarnessError::InvalidServer { .. }));
        puts.assert_calls(0);
        Ok(())
    }

    #[test]
    fn policy_follows_worker_count_unless_overridden() {
        let mut options = ReplayOptions::new("a", "b", PackageType::Maven);
        assert!(options.policy().fail_fast);
        options.workers = 4;
        assert!(!options.policy().fail_fast);
        options.fail_fast = Some(true);
        assert_eq!(options.policy(), BatchPolicy { workers: 4, fail_fast: true });
    }
}
