//! Test dataset collection from PNC and the recording server.
//!
//! Layout produced under `{root}/dataset/{id}`:
//!
//! - `info.json`, plus `build.json` for a single build or `group-build.json`,
//!   `dependency-graph.json` and `build-queue.yaml` for a group build.
//! - Per build (`.` or `builds/{buildId}`): `align.log`, `da.json` with the
//!   metadata paths named by the alignment log, and `tracking.json`.
//!
//! Files already present are left alone so an interrupted run can resume.

use std::path::{Path, PathBuf};

use indy_harness_config::PackageType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::depgraph::{DepGraph, graph_queue, queue_yaml};
use crate::error::{HarnessError, HarnessResult};
use crate::files::file_exists;
use crate::http::{IndyClient, Method, RequestSpec};
use crate::rewrite::normalize_base;

/// Directory holding every collected dataset.
pub const DATASET_DIR: &str = "dataset";
/// Dataset description file.
pub const INFO_JSON: &str = "info.json";
/// Metadata paths parsed from the alignment log.
pub const DA_JSON: &str = "da.json";
/// Tracking record of the build.
pub const TRACKING_JSON: &str = "tracking.json";
/// Optional list of extra group constituents.
pub const ADDITIONAL_REPOS_JSON: &str = "additional-repos.json";
/// Raw alignment log.
pub const ALIGN_LOG: &str = "align.log";
/// PNC build document.
pub const BUILD_JSON: &str = "build.json";
/// PNC group build document.
pub const GROUP_BUILD_JSON: &str = "group-build.json";
/// PNC dependency graph of a group build.
pub const DEPENDENCY_GRAPH_JSON: &str = "dependency-graph.json";
/// Build queue derived from the dependency graph.
pub const BUILD_QUEUE_YAML: &str = "build-queue.yaml";
/// Directory holding the member builds of a group build.
pub const BUILDS_DIR: &str = "builds";

static REST_CLIENT_RESULT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)REST Client returned.*?\}").ok());

/// Description of a collected dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetInfo {
    /// PNC instance the build came from.
    pub pnc_base_url: String,
    /// PNC build or group build id.
    pub build_id: String,
    /// PNC build type (`MVN`, `NPM`, ...).
    pub build_type: String,
    /// Whether the build was a temporary build.
    pub temporary_build: bool,
}

impl DatasetInfo {
    /// Describe build `build_id` from its PNC document.
    #[must_use]
    pub fn from_build(pnc_base_url: &str, build_id: &str, build: &Value) -> Self {
        Self {
            pnc_base_url: pnc_base_url.to_string(),
            build_id: build_id.to_string(),
            build_type: build
                .pointer("/buildConfigRevision/buildType")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            temporary_build: build
                .get("temporaryBuild")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// Package type implied by the build type.
    #[must_use]
    pub fn package_type(&self) -> PackageType {
        if self.build_type.eq_ignore_ascii_case("NPM") {
            PackageType::Npm
        } else {
            PackageType::Maven
        }
    }

    /// Dependency-analysis group holding the aligned metadata.
    #[must_use]
    pub const fn da_group(&self) -> &'static str {
        if self.temporary_build {
            "DA-temporary-builds"
        } else {
            "DA"
        }
    }
}

/// `maven-metadata.xml` paths of every dependency listed by the alignment
/// REST client in `align_log`.
#[must_use]
pub fn maven_metadata_paths(align_log: &str) -> Vec<String> {
    let Some(pattern) = REST_CLIENT_RESULT.as_ref() else {
        return Vec::new();
    };
    let mut paths = Vec::new();
    for found in pattern.find_iter(align_log) {
        let text = found.as_str();
        let Some(open) = text.find('{') else {
            continue;
        };
        let gavs = &text[open + 1..text.len() - 1];
        for gav in gavs.split(',') {
            let mut segments = gav.split(':');
            let (Some(group), Some(artifact)) = (segments.next(), segments.next()) else {
                continue;
            };
            let group = group.trim();
            if group.is_empty() {
                continue;
            }
            paths.push(format!("{}/{artifact}/maven-metadata.xml", group.replace('.', "/")));
        }
    }
    info!(paths = paths.len(), "parsed alignment metadata paths");
    paths
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> HarnessResult<T> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| HarnessError::io("read dataset file", path, source))?;
    serde_json::from_slice(&raw).map_err(|source| HarnessError::Json {
        origin: path.display().to_string(),
        source,
    })
}

async fn write_pretty(path: &Path, value: &impl Serialize) -> HarnessResult<()> {
    let pretty = serde_json::to_string_pretty(value).map_err(|source| HarnessError::Json {
        origin: path.display().to_string(),
        source,
    })?;
    tokio::fs::write(path, pretty)
        .await
        .map_err(|source| HarnessError::io("write dataset file", path, source))
}

/// Load `info.json`.
///
/// # Errors
///
/// Returns an error when the file is missing or malformed.
pub async fn load_info(path: &Path) -> HarnessResult<DatasetInfo> {
    read_json(path).await
}

/// Load `additional-repos.json`; a missing file means no extra repositories.
///
/// # Errors
///
/// Returns an error when the file exists but is malformed.
pub async fn load_additional_repos(path: &Path) -> HarnessResult<Vec<String>> {
    if !file_exists(path).await {
        return Ok(Vec::new());
    }
    read_json(path).await
}

/// Load the metadata paths of `da.json`.
///
/// # Errors
///
/// Returns an error when the file is missing or malformed.
pub async fn load_metadata_paths(path: &Path) -> HarnessResult<Vec<String>> {
    read_json(path).await
}

/// Fetch a JSON document into `dest` as indented JSON unless it exists.
async fn fetch_json(client: &IndyClient, url: &str, dest: &Path) -> HarnessResult<()> {
    if file_exists(dest).await {
        return Ok(());
    }
    let document: Value = client.get_json(url).await?;
    write_pretty(dest, &document).await?;
    info!(url, file = %dest.display(), "stored dataset document");
    Ok(())
}

async fn create_dir(dir: &Path) -> HarnessResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| HarnessError::io("create dataset dir", dir, source))
}

/// Collect the alignment log, metadata paths and tracking record of one build
/// into `dir`.
///
/// # Errors
///
/// Returns an error when the alignment log cannot be fetched or a file
/// cannot be written. A missing tracking record is only logged.
pub async fn collect_build(
    client: &IndyClient,
    pnc_base: &str,
    indy_base: &str,
    dir: &Path,
    build_id: &str,
) -> HarnessResult<()> {
    create_dir(dir).await?;

    let align_file = dir.join(ALIGN_LOG);
    if !file_exists(&align_file).await {
        let url = format!("{}pnc-rest/v2/builds/{build_id}/logs/align", normalize_base(pnc_base));
        let response = client
            .send(
                RequestSpec::new(&url, Method::Get)
                    .with_response_body()
                    .with_header("Accept", "text/plain"),
            )
            .await?;
        if !response.success {
            return Err(HarnessError::Status {
                url,
                status: response.status,
            });
        }
        tokio::fs::write(&align_file, &response.body)
            .await
            .map_err(|source| HarnessError::io("write alignment log", &align_file, source))?;
        write_pretty(&dir.join(DA_JSON), &maven_metadata_paths(&response.body)).await?;
    }

    let tracking_file = dir.join(TRACKING_JSON);
    if !file_exists(&tracking_file).await {
        let url = format!("{}api/folo/admin/build-{build_id}/report", normalize_base(indy_base));
        if !client.download(&url, &tracking_file).await {
            warn!(url, build = build_id, "tracking record not collected");
        }
    }
    Ok(())
}

/// Collect the dataset of PNC build or group build `build_id` below `root`
/// and return the dataset directory.
///
/// # Errors
///
/// Returns an error when a PNC document cannot be fetched, the dependency
/// graph is cyclic, or a file cannot be written.
pub async fn run_dataset(
    client: &IndyClient,
    pnc_base: &str,
    indy_base: &str,
    build_id: &str,
    root: &Path,
) -> HarnessResult<PathBuf> {
    let dir = root.join(DATASET_DIR).join(build_id);
    create_dir(&dir).await?;

    let pnc = normalize_base(pnc_base);
    let group_url = format!("{pnc}pnc-rest/v2/group-builds/{build_id}");
    let group_build = client.get(&group_url).await.status == 200;
    let (build_url, build_file) = if group_build {
        (group_url, dir.join(GROUP_BUILD_JSON))
    } else {
        (format!("{pnc}pnc-rest/v2/builds/{build_id}"), dir.join(BUILD_JSON))
    };
    info!(build = build_id, group_build, "collecting dataset");
    fetch_json(client, &build_url, &build_file).await?;

    let info_file = dir.join(INFO_JSON);
    if !file_exists(&info_file).await {
        let build: Value = read_json(&build_file).await?;
        let info = DatasetInfo::from_build(pnc_base, build_id, &build);
        write_pretty(&info_file, &info).await?;
        info!(
            build = build_id,
            build_type = %info.build_type,
            temporary = info.temporary_build,
            "wrote dataset info"
        );
    }

    if !group_build {
        collect_build(client, pnc_base, indy_base, &dir, build_id).await?;
        return Ok(dir);
    }

    let graph_file = dir.join(DEPENDENCY_GRAPH_JSON);
    fetch_json(client, &format!("{build_url}/dependency-graph"), &graph_file).await?;
    let graph: DepGraph = read_json(&graph_file).await?;

    let queue_file = dir.join(BUILD_QUEUE_YAML);
    let yaml = queue_yaml(&graph_queue(&graph)?)?;
    tokio::fs::write(&queue_file, yaml)
        .await
        .map_err(|source| HarnessError::io("write build queue", &queue_file, source))?;

    let builds = dir.join(BUILDS_DIR);
    for member in graph.vertices.keys() {
        collect_build(client, pnc_base, indy_base, &builds.join(member), member).await?;
    }
    Ok(dir)
}
