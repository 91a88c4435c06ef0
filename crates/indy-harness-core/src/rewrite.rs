//! Mapping of recorded artifact references onto a session namespace.
//!
//! # Design
//! - Pure functions: no I/O, no logging beyond skipped entries.
//! - Version renumbering is a [`PathRewriteRule`] chosen per package type.
//! - Server bases are normalised to `scheme://host[:port]/` before joining.

use std::path::PathBuf;

use indy_harness_config::PackageType;
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use tracing::warn;

use crate::model::{
    BuildName, CHANNEL_GENERIC_PROXY, StoreKey, TrackedContent, TrackedContentEntry,
    store_key_to_path,
};

static VERSION_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"redhat-([0-9]+)").ok());

/// Strategy renumbering the release marker inside an artifact path.
pub trait PathRewriteRule: Send + Sync {
    /// Return `path` with its release marker replaced by `version`.
    fn rewrite(&self, path: &str, version: &str) -> String;
}

/// Replaces every `redhat-<digits>` marker in the whole path.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedhatVersionRule;

impl PathRewriteRule for RedhatVersionRule {
    fn rewrite(&self, path: &str, version: &str) -> String {
        rewrite_version(path, version)
    }
}

/// npm variant: only the version part of the tarball name after `/-/` is
/// renumbered, so package names are never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NpmTarballRule;

impl PathRewriteRule for NpmTarballRule {
    fn rewrite(&self, path: &str, version: &str) -> String {
        let Some((package, tarball)) = path.split_once("/-/") else {
            return rewrite_version(path, version);
        };
        let name = package.rsplit('/').next().unwrap_or(package);
        let prefix_len = tarball
            .strip_prefix(name)
            .filter(|rest| !name.is_empty() && rest.starts_with('-'))
            .map_or(0, |_| name.len() + 1);
        let (prefix, remainder) = tarball.split_at(prefix_len);
        format!("{package}/-/{prefix}{}", rewrite_version(remainder, version))
    }
}

static MAVEN_RULE: RedhatVersionRule = RedhatVersionRule;
static NPM_RULE: NpmTarballRule = NpmTarballRule;

/// Rewrite rule used for `package_type`.
#[must_use]
pub fn rule_for(package_type: PackageType) -> &'static dyn PathRewriteRule {
    match package_type {
        PackageType::Maven => &MAVEN_RULE,
        PackageType::Npm => &NPM_RULE,
    }
}

/// Replace every `redhat-<digits>` marker with `redhat-<version>`. Paths
/// without a marker come back unchanged.
#[must_use]
pub fn rewrite_version(path: &str, version: &str) -> String {
    let replacement = format!("redhat-{version}");
    VERSION_PATTERN.as_ref().map_or_else(
        || path.to_string(),
        |pattern| {
            pattern
                .replace_all(path, NoExpand(&replacement))
                .into_owned()
        },
    )
}

/// Ensure a scheme and a trailing slash: `indy:8080` becomes `http://indy:8080/`.
#[must_use]
pub fn normalize_base(raw: &str) -> String {
    let mut base = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    if !base.ends_with('/') {
        base.push('/');
    }
    base
}

fn relative(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Unit of work for the batch executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    /// Recorded artifact path.
    pub path: String,
    /// Recorded MD5, empty when unknown.
    pub checksum: String,
    /// Source on the original server; `None` for downloads.
    pub original_url: Option<String>,
    /// Destination on the target server.
    pub target_url: String,
}

impl TransferJob {
    /// Cache location of the artifact relative to a cache root: the recorded
    /// path without empty, `.` or `..` segments.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.path
            .split('/')
            .filter(|segment| !matches!(*segment, "" | "." | ".."))
            .collect()
    }
}

/// Download URL for a recorded entry under the session namespace.
#[must_use]
pub fn download_url(
    target_base: &str,
    build: &BuildName,
    package_type: PackageType,
    entry: &TrackedContentEntry,
    additional_repos: &[String],
) -> String {
    let base = normalize_base(target_base);
    let path = relative(&entry.path);
    if entry.access_channel == CHANNEL_GENERIC_PROXY {
        let store_path = store_key_to_path(&entry.store_key);
        return format!("{base}api/content/{store_path}/{path}");
    }
    if additional_repos.iter().any(|repo| repo == &entry.store_key) {
        let store_path = store_key_to_path(&entry.store_key);
        return format!("{base}api/folo/track/{build}/{store_path}/{path}");
    }
    format!("{base}api/folo/track/{build}/{package_type}/group/{build}/{path}")
}

/// Original fetch URL and tracked target upload URL for a recorded upload.
///
/// Returns `None` when the entry's store key is not a full composite key.
#[must_use]
pub fn upload_urls(
    original_base: &str,
    target_base: &str,
    build: &BuildName,
    entry: &TrackedContentEntry,
    rule: &dyn PathRewriteRule,
) -> Option<(String, String)> {
    let store = StoreKey::parse(&entry.store_key)?;
    let original = normalize_base(original_base);
    let target = normalize_base(target_base);
    let path = relative(&entry.path);

    let original_url = format!("{original}api/content/{}/{path}", store.to_path());
    let altered = rule.rewrite(path, build.version_suffix());
    let target_url = format!(
        "{target}api/folo/track/{build}/{}/{}/{build}/{altered}",
        store.package, store.kind
    );
    Some((original_url, target_url))
}

/// Download jobs in record order.
#[must_use]
pub fn download_jobs(
    target_base: &str,
    build: &BuildName,
    package_type: PackageType,
    record: &TrackedContent,
    additional_repos: &[String],
) -> Vec<TransferJob> {
    record
        .downloads
        .iter()
        .filter(|entry| replayable(entry, "download"))
        .map(|entry| TransferJob {
            path: entry.path.clone(),
            checksum: entry.md5.clone(),
            original_url: None,
            target_url: download_url(target_base, build, package_type, entry, additional_repos),
        })
        .collect()
}

/// Upload jobs in record order.
#[must_use]
pub fn upload_jobs(
    original_base: &str,
    target_base: &str,
    build: &BuildName,
    record: &TrackedContent,
    rule: &dyn PathRewriteRule,
) -> Vec<TransferJob> {
    record
        .uploads
        .iter()
        .filter(|entry| replayable(entry, "upload"))
        .filter_map(|entry| {
            let urls = upload_urls(original_base, target_base, build, entry, rule);
            if urls.is_none() {
                warn!(
                    path = %entry.path,
                    store = %entry.store_key,
                    "skipping upload with malformed store key"
                );
            }
            urls.map(|(original_url, target_url)| TransferJob {
                path: entry.path.clone(),
                checksum: entry.md5.clone(),
                original_url: Some(original_url),
                target_url,
            })
        })
        .collect()
}

fn replayable(entry: &TrackedContentEntry, kind: &'static str) -> bool {
    let ok = entry.is_replayable();
    if !ok {
        warn!(
            kind,
            path = %entry.path,
            store = %entry.store_key,
            "skipping incomplete record entry"
        );
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, store_key: &str, channel: &str) -> TrackedContentEntry {
        TrackedContentEntry {
            access_channel: channel.to_string(),
            path: path.to_string(),
            store_key: store_key.to_string(),
            md5: "md5".to_string(),
            ..TrackedContentEntry::default()
        }
    }

    fn build() -> BuildName {
        BuildName::parse("build-test-94465").expect("build name")
    }

    #[test]
    fn version_rewrite_concrete_case() {
        let path = concat!(
            "/org/apache/kafka/connect-api/2.7.0.redhat-00012",
            "/connect-api-2.7.0.redhat-00012-javadoc.jar",
        );
        assert_eq!(
            rewrite_version(path, "999999"),
            concat!(
                "/org/apache/kafka/connect-api/2.7.0.redhat-999999",
                "/connect-api-2.7.0.redhat-999999-javadoc.jar",
            )
        );
    }

    #[test]
    fn version_rewrite_is_not_cumulative() {
        let paths = [
            "/org/x/y/1.0.redhat-00001/y-1.0.redhat-00001.jar",
            "/org/x/y/redhat-7/y.pom",
            "/a/b/c-2.0.0-redhat-42.tgz",
        ];
        for path in paths {
            assert_eq!(
                rewrite_version(&rewrite_version(path, "99999"), "88888"),
                rewrite_version(path, "88888")
            );
        }
    }

    #[test]
    fn version_rewrite_without_marker_is_noop() {
        assert_eq!(rewrite_version("/org/x/y/1.0/y-1.0.jar", "1"), "/org/x/y/1.0/y-1.0.jar");
    }

    #[test]
    fn npm_rule_only_touches_tarball() {
        let rule = rule_for(PackageType::Npm);
        assert_eq!(
            rule.rewrite("/redhat-1-tools/-/redhat-1-tools-1.0.0-redhat-00003.tgz", "5"),
            "/redhat-1-tools/-/redhat-1-tools-1.0.0-redhat-5.tgz"
        );
        assert_eq!(rule.rewrite("/left-pad/1.0.0-redhat-2", "5"), "/left-pad/1.0.0-redhat-5");
    }

    #[test]
    fn npm_rule_keeps_scoped_package_names() {
        let rule = rule_for(PackageType::Npm);
        assert_eq!(
            rule.rewrite(
                "/@redhat-7/redhat-7-cli/-/redhat-7-cli-2.1.0-redhat-00010.tgz",
                "42"
            ),
            "/@redhat-7/redhat-7-cli/-/redhat-7-cli-2.1.0-redhat-42.tgz"
        );
        assert_eq!(
            rule.rewrite("/@scope/name/-/other-1.0.0-redhat-1.tgz", "9"),
            "/@scope/name/-/other-1.0.0-redhat-9.tgz"
        );
    }

    #[test]
    fn normalize_base_adds_scheme_and_slash() {
        assert_eq!(normalize_base("indy:8080"), "http://indy:8080/");
        assert_eq!(normalize_base("https://indy/"), "https://indy/");
    }

    #[test]
    fn download_url_strategies() {
        let name = build();
        let native = entry("/org/x/y/1.0/y-1.0.jar", "maven:remote:central", "NATIVE");
        assert_eq!(
            download_url("indy", &name, PackageType::Maven, &native, &[]),
            concat!(
                "http://indy/api/folo/track/build-test-94465/maven/group/build-test-94465",
                "/org/x/y/1.0/y-1.0.jar",
            )
        );

        let proxied =
            entry("/pkg/file.zip", "generic-http:remote:h-example", CHANNEL_GENERIC_PROXY);
        assert_eq!(
            download_url("indy", &name, PackageType::Maven, &proxied, &[]),
            "http://indy/api/content/generic-http/remote/h-example/pkg/file.zip"
        );

        let extra = entry("/org/z/z.pom", "maven:hosted:extra", "NATIVE");
        assert_eq!(
            download_url(
                "indy",
                &name,
                PackageType::Maven,
                &extra,
                &["maven:hosted:extra".to_string()]
            ),
            "http://indy/api/folo/track/build-test-94465/maven/hosted/extra/org/z/z.pom"
        );
    }

    #[test]
    fn replay_jobs_for_recorded_build() {
        let record = TrackedContent {
            downloads: vec![entry("/org/x/y/1.0/y-1.0.jar", "maven:remote:central", "NATIVE")],
            uploads: vec![entry(
                "/org/x/y/1.0/y-1.0.redhat-00001.jar",
                "maven:hosted:build-1234",
                "NATIVE",
            )],
            ..TrackedContent::default()
        };
        let name = build();

        let downloads = download_jobs("http://target", &name, PackageType::Maven, &record, &[]);
        assert_eq!(downloads.len(), 1);
        assert!(downloads[0].target_url.ends_with(
            "/api/folo/track/build-test-94465/maven/group/build-test-94465/org/x/y/1.0/y-1.0.jar"
        ));
        assert_eq!(downloads[0].cache_path(), PathBuf::from("org/x/y/1.0/y-1.0.jar"));

        let uploads = upload_jobs(
            "http://origin",
            "http://target",
            &name,
            &record,
            rule_for(PackageType::Maven),
        );
        assert_eq!(uploads.len(), 1);
        let job = &uploads[0];
        assert_eq!(
            job.original_url.as_deref(),
            Some(concat!(
                "http://origin/api/content/maven/hosted/build-1234",
                "/org/x/y/1.0/y-1.0.redhat-00001.jar",
            ))
        );
        assert!(job.target_url.contains("/y-1.0.redhat-94465.jar"));
        assert!(job.target_url.starts_with(
            "http://target/api/folo/track/build-test-94465/maven/hosted/build-test-94465/"
        ));
        assert_eq!(job.cache_path(), PathBuf::from("org/x/y/1.0/y-1.0.redhat-00001.jar"));
    }

    #[test]
    fn incomplete_entries_are_skipped() {
        let record = TrackedContent {
            downloads: vec![entry("", "maven:remote:central", "NATIVE")],
            uploads: vec![
                entry("/a.jar", "", "NATIVE"),
                entry("/b.jar", "maven-hosted", "NATIVE"),
            ],
            ..TrackedContent::default()
        };
        let name = build();
        assert!(download_jobs("t", &name, PackageType::Maven, &record, &[]).is_empty());
        assert!(upload_jobs("o", "t", &name, &record, rule_for(PackageType::Maven)).is_empty());
    }
}
