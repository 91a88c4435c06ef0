//! Tracking-record ("folo") access on an Indy server.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::path::Path;

use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::files::is_regular_file;
use crate::http::IndyClient;
use crate::model::{BuildName, TrackedContent, TrackedContentEntry};
use crate::rewrite::{PathRewriteRule, normalize_base};

/// Admin URL of a tracking record.
#[must_use]
pub fn record_url(base: &str, id: &str) -> String {
    format!("{}api/folo/admin/{id}/record", normalize_base(base))
}

/// Fetch and decode the sealed record `id`.
///
/// # Errors
///
/// Returns an error on transport failure, failure status or malformed JSON.
pub async fn fetch_record(
    client: &IndyClient,
    base: &str,
    id: &str,
) -> HarnessResult<TrackedContent> {
    let url = record_url(base, id);
    let record: TrackedContent = client.get_json(&url).await?;
    info!(
        id,
        url = %url,
        downloads = record.downloads.len(),
        uploads = record.uploads.len(),
        "fetched tracking record"
    );
    Ok(record)
}

/// Decode a record previously saved to disk.
///
/// # Errors
///
/// Returns [`HarnessError::Io`] or [`HarnessError::Json`].
pub async fn load_record(path: &Path) -> HarnessResult<TrackedContent> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| HarnessError::io("read tracking record", path, source))?;
    serde_json::from_slice(&raw).map_err(|source| HarnessError::Json {
        origin: path.display().to_string(),
        source,
    })
}

/// Seal the record so it becomes immutable.
pub async fn seal_record(client: &IndyClient, base: &str, id: &str) -> bool {
    let url = record_url(base, id);
    let sealed = client.post_empty(&url).await.success;
    if sealed {
        info!(id, "tracking record sealed");
    } else {
        warn!(id, url = %url, "tracking record sealing failed");
    }
    sealed
}

/// Delete the record.
pub async fn delete_record(client: &IndyClient, base: &str, id: &str) -> bool {
    let url = record_url(base, id);
    let deleted = client.delete(&url).await.success;
    if deleted {
        info!(id, "tracking record deleted");
    } else {
        warn!(id, url = %url, "tracking record deletion failed");
    }
    deleted
}

/// Difference between the replayed record and the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordMismatch {
    /// Expected path absent from the replayed record.
    Missing(String),
    /// Path present with a different MD5.
    Md5(String),
}

impl Display for RecordMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "missing entry {path}"),
            Self::Md5(path) => write!(f, "md5 mismatch for {path}"),
        }
    }
}

/// Compare the replayed `record` of `build` against `original`.
///
/// Only regular files are compared: uploads at their rewritten path,
/// downloads unchanged. Metadata is regenerated by the server.
///
/// # Errors
///
/// Returns [`HarnessError::InvalidRecord`] when the record key does not
/// match `build`.
pub fn compare_records(
    build: &BuildName,
    original: &TrackedContent,
    record: &TrackedContent,
    rule: &dyn PathRewriteRule,
) -> HarnessResult<Vec<RecordMismatch>> {
    if record.tracking_key.id != build.as_str() {
        return Err(HarnessError::InvalidRecord {
            id: record.tracking_key.id.clone(),
            reason: "record key does not match build",
        });
    }
    let uploads = index(&record.uploads);
    let downloads = index(&record.downloads);
    let mut mismatches = Vec::new();

    for entry in original.uploads.iter().filter(|entry| is_regular_file(&entry.path)) {
        let altered = rule.rewrite(&entry.path, build.version_suffix());
        check(&uploads, &altered, &entry.md5, &mut mismatches);
    }
    for entry in original.downloads.iter().filter(|entry| is_regular_file(&entry.path)) {
        check(&downloads, &entry.path, &entry.md5, &mut mismatches);
    }
    Ok(mismatches)
}

/// Refetch the record of `build` and compare it against `original`.
///
/// # Errors
///
/// Propagates fetch failures and key mismatches.
pub async fn verify_record(
    client: &IndyClient,
    base: &str,
    build: &BuildName,
    original: &TrackedContent,
    rule: &dyn PathRewriteRule,
) -> HarnessResult<Vec<RecordMismatch>> {
    let record = fetch_record(client, base, build.as_str()).await?;
    let mismatches = compare_records(build, original, &record, rule)?;
    for mismatch in &mismatches {
        warn!(build = %build, mismatch = %mismatch, "tracking record differs from original");
    }
    if mismatches.is_empty() {
        info!(build = %build, "tracking record matches original");
    }
    Ok(mismatches)
}

fn index(entries: &[TrackedContentEntry]) -> HashMap<&str, &str> {
    entries
        .iter()
        .map(|entry| (entry.path.as_str(), entry.md5.as_str()))
        .collect()
}

fn check(
    entries: &HashMap<&str, &str>,
    path: &str,
    md5: &str,
    mismatches: &mut Vec<RecordMismatch>,
) {
    match entries.get(path) {
        None => mismatches.push(RecordMismatch::Missing(path.to_string())),
        Some(actual) if *actual != md5 => mismatches.push(RecordMismatch::Md5(path.to_string())),
        Some(_) => {}
    }
}
