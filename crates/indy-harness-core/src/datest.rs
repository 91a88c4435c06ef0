//! Dependency-analysis metadata lookups.
//!
//! Alignment reports list the managed dependencies of each module; every
//! dependency maps to one `maven-metadata.xml` in the DA group. Lookups run
//! through the batch executor and never stop early.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::batch::{BatchOutcome, BatchPolicy, run_batch};
use crate::error::{HarnessError, HarnessResult};
use crate::http::{IndyClient, Method, RequestSpec};
use crate::rewrite::normalize_base;
use crate::server::validate_server;

const ERROR_MARKER: &str = "Message:";

/// Alignment report produced for one build.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaReport {
    /// Modules of the aligned project.
    #[serde(default)]
    pub modules: Vec<DaModule>,
}

/// One aligned module.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaModule {
    /// Managed dependencies of the module.
    #[serde(rename = "managedDependencies", default)]
    pub managed_dependencies: ManagedDependencies,
}

/// Managed dependency table keyed by coordinate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManagedDependencies {
    /// Dependencies keyed by their GAV string.
    #[serde(default)]
    pub dependencies: BTreeMap<String, Dependency>,
}

/// Group and artifact of a managed dependency.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dependency {
    /// Maven group id.
    #[serde(rename = "groupId", default)]
    pub group_id: String,
    /// Maven artifact id.
    #[serde(rename = "artifactId", default)]
    pub artifact_id: String,
}

/// Metadata URLs for every managed dependency of `report`.
#[must_use]
pub fn metadata_urls(base: &str, da_group: &str, report: &DaReport) -> Vec<String> {
    let base = normalize_base(base);
    report
        .modules
        .iter()
        .flat_map(|module| module.managed_dependencies.dependencies.values())
        .map(|dependency| {
            format!(
                "{base}api/content/maven/group/{da_group}/{}/{}/maven-metadata.xml",
                dependency.group_id.replace('.', "/"),
                dependency.artifact_id
            )
        })
        .collect()
}

/// Read every report in `dir`, in file-name order. Files that are not valid
/// reports are skipped with a warning.
///
/// # Errors
///
/// Returns [`HarnessError::Io`] when the directory or a file cannot be read.
pub async fn load_reports(dir: &Path) -> HarnessResult<Vec<DaReport>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| HarnessError::io("list reports", dir, source))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| HarnessError::io("list reports", dir, source))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|source| HarnessError::io("inspect report", &path, source))?;
        if file_type.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|source| HarnessError::io("read report", &path, source))?;
        match serde_json::from_slice::<DaReport>(&raw) {
            Ok(report) => {
                info!(
                    file = %path.display(),
                    modules = report.modules.len(),
                    "loaded alignment report"
                );
                reports.push(report);
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "skipping unreadable alignment report");
            }
        }
    }
    Ok(reports)
}

/// Fetch one metadata document. Returns `false` when the server answered
/// with an error page.
pub async fn lookup_metadata(client: &IndyClient, url: &str) -> bool {
    let response = client
        .request(
            RequestSpec::new(url, Method::Get)
                .with_response_body()
                .with_header("Accept", "application/xml"),
        )
        .await;
    if response.body.contains(ERROR_MARKER) {
        warn!(
            url,
            status = response.status,
            body = %response.body,
            "metadata lookup returned an error"
        );
        return false;
    }
    info!(url, status = response.status, "metadata looked up");
    true
}

/// Look up every URL with `workers` concurrent requests.
///
/// # Errors
///
/// Propagates executor errors.
pub async fn lookup_all(
    client: &IndyClient,
    urls: Vec<String>,
    workers: usize,
) -> HarnessResult<BatchOutcome> {
    info!(requests = urls.len(), workers, "looking up metadata");
    let client = client.clone();
    let policy = BatchPolicy::for_workers(workers).with_fail_fast(false);
    let outcome = run_batch(policy, urls, move |url| {
        let client = client.clone();
        async move { Ok(lookup_metadata(&client, &url).await) }
    })
    .await?;
    info!(attempted = outcome.attempted, failed = outcome.failed, "metadata lookups finished");
    Ok(outcome)
}

/// Look up the metadata of every report in `dir` through `da_group`.
///
/// # Errors
///
/// Returns an error for an invalid server or an unreadable directory.
pub async fn run_datest(
    client: &IndyClient,
    target: &str,
    da_group: &str,
    dir: &Path,
    workers: usize,
) -> HarnessResult<BatchOutcome> {
    let server = validate_server(client, target).await?;
    let urls: Vec<String> = load_reports(dir)
        .await?
        .iter()
        .flat_map(|report| metadata_urls(&server.base_url, da_group, report))
        .collect();
    lookup_all(client, urls, workers).await
}
