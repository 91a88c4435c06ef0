//! Path promotion between stores and its rollback.
//!
//! # Design
//! - Requests fail when a path already exists at the target; callers treat a
//!   failed promotion as a hard error rather than retrying.
//! - Rollback replays the promotion receipt verbatim.

use indy_harness_config::PackageType;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::files::is_metadata;
use crate::http::{HttpResponse, IndyClient};
use crate::model::{BuildName, TrackedContent};
use crate::rewrite::{PathRewriteRule, normalize_base};

/// Default promotion target store name.
pub const DEFAULT_PROMOTE_TARGET: &str = "pnc-builds";

/// Promotion request document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteRequest {
    /// Server-side asynchronous execution.
    #[serde(rename = "async")]
    pub asynchronous: bool,
    /// Source store key.
    pub source: String,
    /// Target store key.
    pub target: String,
    /// Paths to promote; all paths of the source when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    /// Remove promoted content from the source.
    pub purge_source: bool,
    /// Report without moving content.
    pub dry_run: bool,
    /// Emit store events for promoted paths.
    pub fire_events: bool,
    /// Fail instead of overwriting existing target paths.
    pub fail_when_exists: bool,
}

impl PromoteRequest {
    /// Synchronous, non-purging, failing-on-conflict request.
    #[must_use]
    pub const fn new(source: String, target: String, paths: Vec<String>, dry_run: bool) -> Self {
        Self {
            asynchronous: false,
            source,
            target,
            paths,
            purge_source: false,
            dry_run,
            fire_events: true,
            fail_when_exists: true,
        }
    }
}

/// Inputs of [`promote_build`].
#[derive(Debug, Clone, Default)]
pub struct PromoteOptions {
    /// Source store key; defaults to the store of the first upload.
    pub source: Option<String>,
    /// Target store key.
    pub target: String,
    /// Version suffix applied to promoted paths, if renumbered.
    pub new_version: Option<String>,
    /// Ask the server for a dry run.
    pub dry_run: bool,
}

fn promote_url(base: &str) -> String {
    format!("{}api/promotion/paths/promote", normalize_base(base))
}

fn rollback_url(base: &str) -> String {
    format!("{}api/promotion/paths/rollback", normalize_base(base))
}

fn ignored() -> HttpResponse {
    HttpResponse {
        body: String::new(),
        status: 200,
        success: true,
    }
}

/// Send one promotion request. The response body is the rollback receipt.
///
/// # Errors
///
/// Returns [`HarnessError::Json`] if the request cannot be encoded.
pub async fn promote(
    client: &IndyClient,
    base: &str,
    request: &PromoteRequest,
) -> HarnessResult<HttpResponse> {
    let document = serde_json::to_string_pretty(request).map_err(|source| HarnessError::Json {
        origin: "promote request".to_string(),
        source,
    })?;
    info!(
        source = %request.source,
        target = %request.target,
        paths = request.paths.len(),
        dry_run = request.dry_run,
        "promoting paths"
    );
    let response = client.post_text(&promote_url(base), document).await;
    if response.success {
        info!(status = response.status, result = %response.body, "promotion finished");
    } else {
        warn!(status = response.status, result = %response.body, "promotion failed");
    }
    Ok(response)
}

/// Reverse a promotion from its receipt.
pub async fn rollback(
    client: &IndyClient,
    base: &str,
    receipt: &str,
    dry_run: bool,
) -> HttpResponse {
    if dry_run {
        info!(receipt, "dry run: skipping promotion rollback");
        return ignored();
    }
    let response = client.post_text(&rollback_url(base), receipt.to_string()).await;
    if response.success {
        info!(status = response.status, result = %response.body, "rollback finished");
    } else {
        warn!(status = response.status, result = %response.body, "rollback failed");
    }
    response
}

/// Non-metadata upload paths, renumbered when `new_version` is set.
#[must_use]
pub fn promotion_paths(
    record: &TrackedContent,
    new_version: Option<&str>,
    rule: &dyn PathRewriteRule,
) -> Vec<String> {
    record
        .uploads
        .iter()
        .filter(|entry| !is_metadata(&entry.path))
        .map(|entry| match new_version {
            Some(version) if !version.is_empty() => rule.rewrite(&entry.path, version),
            _ => entry.path.clone(),
        })
        .collect()
}

/// Promote the uploads of `record`. A record without uploads is a successful
/// no-op.
///
/// # Errors
///
/// Propagates request encoding failures.
pub async fn promote_build(
    client: &IndyClient,
    base: &str,
    record: &TrackedContent,
    options: PromoteOptions,
    rule: &dyn PathRewriteRule,
) -> HarnessResult<HttpResponse> {
    let Some(first) = record.uploads.first() else {
        info!(id = %record.tracking_key.id, "no uploads recorded, promotion ignored");
        return Ok(ignored());
    };
    let source = options
        .source
        .filter(|source| !source.is_empty())
        .unwrap_or_else(|| first.store_key.clone());
    let paths = promotion_paths(record, options.new_version.as_deref(), rule);
    let request = PromoteRequest::new(source, options.target, paths, options.dry_run);
    promote(client, base, &request).await
}

/// Source and target store keys for promoting a replayed build.
///
/// # Errors
///
/// Returns [`HarnessError::InvalidRecord`] when the record has no uploads or
/// the first upload has a malformed store key.
pub fn promotion_stores(
    package_type: PackageType,
    build: &BuildName,
    target: Option<&str>,
    record: &TrackedContent,
) -> HarnessResult<(String, String)> {
    let invalid = |reason| HarnessError::InvalidRecord {
        id: record.tracking_key.id.clone(),
        reason,
    };
    let first = record.uploads.first().ok_or_else(|| invalid("no uploads"))?;
    let mut parts = first.store_key.split(':');
    let (Some(package), Some(kind)) = (parts.next(), parts.next()) else {
        return Err(invalid("malformed upload store key"));
    };
    let source = format!("{package}:{kind}:{build}");
    let target_name = target
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_PROMOTE_TARGET);
    let target = format!("{package_type}:hosted:{target_name}");
    info!(source = %source, target = %target, "promotion stores");
    Ok((source, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TrackedContentEntry, TrackingKey};
    use crate::rewrite::RedhatVersionRule;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::error::Error;
    use std::time::Duration;

    fn client() -> IndyClient {
        IndyClient::new(Duration::from_secs(5), None).expect("client")
    }

    fn record() -> TrackedContent {
        let upload = |path: &str| TrackedContentEntry {
            path: path.to_string(),
            store_key: "maven:hosted:build-1234".to_string(),
            ..TrackedContentEntry::default()
        };
        TrackedContent {
            tracking_key: TrackingKey { id: "build-1234".into() },
            uploads: vec![
                upload("/org/x/y/1.0.redhat-00001/y-1.0.redhat-00001.jar"),
                upload("/org/x/y/maven-metadata.xml"),
                upload("/org/x/y/1.0.redhat-00001/y-1.0.redhat-00001.pom"),
            ],
            downloads: Vec::new(),
        }
    }

    #[test]
    fn request_omits_empty_paths() -> Result<(), Box<dyn Error>> {
        let request = PromoteRequest::new("a".into(), "b".into(), Vec::new(), false);
        let value = serde_json::to_value(&request)?;
        assert_eq!(
            value,
            json!({
                "async": false,
                "source": "a",
                "target": "b",
                "purgeSource": false,
                "dryRun": false,
                "fireEvents": true,
                "failWhenExists": true
            })
        );
        Ok(())
    }

    #[test]
    fn paths_skip_metadata_and_follow_renumbering() {
        let paths = promotion_paths(&record(), Some("912345"), &RedhatVersionRule);
        assert_eq!(
            paths,
            vec![
                "/org/x/y/1.0.redhat-912345/y-1.0.redhat-912345.jar",
                "/org/x/y/1.0.redhat-912345/y-1.0.redhat-912345.pom",
            ]
        );
        let unchanged = promotion_paths(&record(), None, &RedhatVersionRule);
        assert_eq!(unchanged[0], "/org/x/y/1.0.redhat-00001/y-1.0.redhat-00001.jar");
    }

    #[test]
    fn stores_derive_from_first_upload() -> Result<(), Box<dyn Error>> {
        let build = BuildName::parse("build-test-912345").ok_or("build name")?;
        let (source, target) = promotion_stores(PackageType::Maven, &build, None, &record())?;
        assert_eq!(source, "maven:hosted:build-test-912345");
        assert_eq!(target, "maven:hosted:pnc-builds");

        let (_, target) =
            promotion_stores(PackageType::Npm, &build, Some("temp-builds"), &record())?;
        assert_eq!(target, "npm:hosted:temp-builds");

        let err = promotion_stores(PackageType::Maven, &build, None, &TrackedContent::default())
            .expect_err("no uploads");
        assert!(matches!(err, HarnessError::InvalidRecord { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn empty_record_skips_promotion() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        let any = server.mock(|when, then| {
            when.method(POST);
            then.status(500);
        });

        let response = promote_build(
            &client(),
            &server.base_url(),
            &TrackedContent::default(),
            PromoteOptions::default(),
            &RedhatVersionRule,
        )
        .await?;
        assert_eq!(response.status, 200);
        assert!(response.success);
        any.assert_calls(0);
        Ok(())
    }

    #[tokio::test]
    async fn promote_then_rollback_with_receipt() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        let receipt = r#"{"request":{"source":"maven:hosted:build-1234"},"completedPaths":["/a"]}"#;
        let promote_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/promotion/paths/promote")
                .json_body(json!({
                    "async": false,
                    "source": "maven:hosted:build-1234",
                    "target": "maven:hosted:pnc-builds",
                    "paths": [
                        "/org/x/y/1.0.redhat-00001/y-1.0.redhat-00001.jar",
                        "/org/x/y/1.0.redhat-00001/y-1.0.redhat-00001.pom"
                    ],
                    "purgeSource": false,
                    "dryRun": false,
                    "fireEvents": true,
                    "failWhenExists": true
                }));
            then.status(200).body(receipt);
        });
        let rollback_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/promotion/paths/rollback")
                .body(receipt);
            then.status(200).body("{}");
        });

        let options = PromoteOptions {
            target: "maven:hosted:pnc-builds".into(),
            ..PromoteOptions::default()
        };
        let base = server.base_url();
        let response =
            promote_build(&client(), &base, &record(), options, &RedhatVersionRule).await?;
        assert!(response.success);
        assert_eq!(response.body, receipt);

        let rolled_back = rollback(&client(), &server.base_url(), &response.body, false).await;
        assert!(rolled_back.success);

        promote_mock.assert();
        rollback_mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn dry_run_rollback_sends_nothing() {
        let server = MockServer::start_async().await;
        let any = server.mock(|when, then| {
            when.method(POST);
            then.status(200);
        });

        let response = rollback(&client(), &server.base_url(), "{}", true).await;
        assert!(response.success);
        any.assert_calls(0);
    }
}
