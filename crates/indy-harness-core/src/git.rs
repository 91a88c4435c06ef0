//! Dataset repository checkout through the `git` executable.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::info;

use crate::error::{HarnessError, HarnessResult};

/// Checkout directory name for `url`: the last path segment without `.git`.
#[must_use]
pub fn repo_dir_name(url: &str) -> String {
    let last = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

async fn git(url: &str, args: &[&str]) -> HarnessResult<String> {
    let output = Command::new("git")
        .args(args)
        .output()
        .await
        .map_err(|err| HarnessError::Git {
            url: url.to_string(),
            detail: err.to_string(),
        })?;
    if !output.status.success() {
        return Err(HarnessError::Git {
            url: url.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Clone `url` below `parent`, or fast-forward an existing checkout, and
/// return the checkout directory.
///
/// # Errors
///
/// Returns [`HarnessError::Git`] when `git` cannot be spawned or exits with
/// a failure status.
pub async fn fetch_repo(url: &str, parent: &Path) -> HarnessResult<PathBuf> {
    let dir = parent.join(repo_dir_name(url));
    let dir_arg = dir.to_string_lossy().into_owned();
    if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
        info!(url, dir = %dir.display(), "updating existing checkout");
        git(url, &["-C", &dir_arg, "pull", "--ff-only"]).await?;
    } else {
        info!(url, dir = %dir.display(), "cloning dataset repository");
        git(url, &["clone", "--recurse-submodules", url, &dir_arg]).await?;
    }
    let head = git(url, &["-C", &dir_arg, "log", "-1", "--oneline"]).await?;
    info!(url, head = %head, "dataset repository ready");
    Ok(dir)
}
