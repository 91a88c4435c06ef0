//! Local cache helpers: file classification and MD5 verification.

use std::path::Path;

use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::error::{HarnessError, HarnessResult};

static REGULAR_FILE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\.(gz|tgz|jar|pom)$|pom\.xml$").ok());

const METADATA_SUFFIXES: [&str; 5] = [
    "maven-metadata.xml",
    "package.json",
    ".md5",
    ".sha1",
    ".sha256",
];

const CHECKSUM_SUFFIXES: [&str; 2] = [".md5", ".sha1"];

const READ_CHUNK: usize = 64 * 1024;

/// Static artifact whose recorded checksum must match the replayed content.
#[must_use]
pub fn is_regular_file(path: &str) -> bool {
    REGULAR_FILE
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(path))
}

/// Server-generated metadata or checksum sibling.
#[must_use]
pub fn is_metadata(path: &str) -> bool {
    METADATA_SUFFIXES
        .iter()
        .any(|suffix| path.ends_with(suffix))
}

/// Lower-case hex MD5 of a file.
///
/// # Errors
///
/// Returns [`HarnessError::Io`] if the file cannot be read.
pub async fn md5_hex(path: &Path) -> HarnessResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| HarnessError::io("open for checksum", path, source))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0_u8; READ_CHUNK];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|source| HarnessError::io("read for checksum", path, source))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verify `path` against `expected` when it is a regular file.
///
/// Metadata and other dynamic files, and entries without a recorded
/// checksum, are accepted without hashing.
///
/// # Errors
///
/// Returns [`HarnessError::ChecksumMismatch`] on mismatch and
/// [`HarnessError::Io`] if the file cannot be read.
pub async fn md5_check(path: &Path, expected: &str) -> HarnessResult<()> {
    let name = path.to_string_lossy();
    if expected.is_empty() || !is_regular_file(&name) {
        debug!(path = %name, "checksum not applicable");
        return Ok(());
    }
    let actual = md5_hex(path).await?;
    if actual.eq_ignore_ascii_case(expected) {
        info!(path = %name, md5 = %actual, "checksum verified");
        Ok(())
    } else {
        Err(HarnessError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Add `.md5` and `.sha1` siblings for every non-checksum path, without
/// duplicating siblings already present. Input order is preserved and
/// siblings follow their artifact.
#[must_use]
pub fn decorate_checksums(paths: &[String]) -> Vec<String> {
    let mut decorated: Vec<String> = Vec::with_capacity(paths.len() * 3);
    for path in paths {
        push_unique(&mut decorated, path.clone());
        if CHECKSUM_SUFFIXES.iter().any(|suffix| path.ends_with(suffix)) {
            continue;
        }
        for suffix in CHECKSUM_SUFFIXES {
            push_unique(&mut decorated, format!("{path}{suffix}"));
        }
    }
    decorated
}

fn push_unique(out: &mut Vec<String>, candidate: String) {
    if !out.contains(&candidate) {
        out.push(candidate);
    }
}

/// Create `dir` (and parents); when `clear` is set, remove existing content first.
///
/// # Errors
///
/// Returns [`HarnessError::Io`] when the directory cannot be removed or created.
pub async fn prepare_dir(dir: &Path, clear: bool) -> HarnessResult<()> {
    if clear && tokio::fs::try_exists(dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|source| HarnessError::io("clear cache dir", dir, source))?;
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| HarnessError::io("create cache dir", dir, source))
}

/// `true` when `path` exists on disk.
pub async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
