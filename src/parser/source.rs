//! Module source classification.
//!
//! This module classifies raw source strings from module declarations into
//! structured [`LocatedSource`] values.
//!
//! # Supported Source Types
//!
//! - **Registry**: `namespace/name/provider` or `tfr:///namespace/name/provider?version=X`
//! - **Git**: `git::https://...`, `git@host:...`, `*.git`, or known Git hosts
//! - **HTTP**: `https://...` (archive downloads)
//! - **Local**: `./path`, `../path`, `/path`
//!
//! Classification is pure and side-effect-free; rules are applied in a fixed
//! order and the first match wins.

use crate::types::{LocatedSource, SourceKind, LOCAL_VERSION, NULL_SENTINEL};
use regex::Regex;
use std::sync::LazyLock;

/// Default Terraform registry hostname.
pub const DEFAULT_REGISTRY: &str = "registry.terraform.io";

// Regex patterns for classifying sources
static TFR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // Matches: tfr:///namespace/name/provider?version=5.8.1
    // or with an explicit registry host: tfr://host/namespace/name/provider
    // Capture groups: 1=host (may be empty), 2=path, 3=version
    Regex::new(r"^tfr://([^/?]*)/([^?]+?)(?:\?version=([^&\s]+))?$").expect("Invalid regex")
});

static GIT_REF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // Extracts ?ref=... / &ref=... from a Git source
    Regex::new(r"[?&]ref=([^&/]+)").expect("Invalid regex")
});

static REGISTRY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // Matches exactly namespace/name/provider; no dots, so file-looking
    // paths (vpc.zip) and hostnames never qualify
    Regex::new(r"^([a-zA-Z0-9_-]+)/([a-zA-Z0-9_-]+)/([a-zA-Z0-9_-]+)$").expect("Invalid regex")
});

/// Hosts that mark a source as Git-backed even without a `git::` wrapper.
const GIT_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// Classify a raw source string.
///
/// Rules, first match wins: the `tfr://` registry scheme, Git sources,
/// local paths, bare `namespace/name/provider` registry triples, plain
/// HTTP(S) URLs, and finally Unknown.
///
/// # Examples
///
/// ```rust
/// use vigie::parser::source::locate;
/// use vigie::types::SourceKind;
///
/// let located = locate("tfr:///terraform-aws-modules/vpc/aws?version=5.8.1");
/// assert_eq!(located.kind, SourceKind::Registry);
/// assert_eq!(located.version, "5.8.1");
///
/// let located = locate("../modules/vpc");
/// assert_eq!(located.kind, SourceKind::Local);
/// assert_eq!(located.version, "local");
/// ```
#[must_use]
pub fn locate(source: &str) -> LocatedSource {
    let source = source.trim();

    if let Some(located) = try_locate_tfr(source) {
        return located;
    }

    if let Some(located) = try_locate_git(source) {
        return located;
    }

    if is_local_path(source) {
        return LocatedSource {
            name: path_basename(source),
            version: LOCAL_VERSION.to_string(),
            clean_source: source.to_string(),
            kind: SourceKind::Local,
        };
    }

    if REGISTRY_PATTERN.is_match(source) {
        return LocatedSource {
            name: path_basename(source),
            version: NULL_SENTINEL.to_string(),
            clean_source: source.to_string(),
            kind: SourceKind::Registry,
        };
    }

    if source.starts_with("http://") || source.starts_with("https://") {
        return LocatedSource {
            name: path_basename(strip_query(source)),
            version: NULL_SENTINEL.to_string(),
            clean_source: strip_query(source).to_string(),
            kind: SourceKind::Http,
        };
    }

    tracing::debug!(source = %source, "Unclassifiable module source");
    LocatedSource {
        name: source.to_string(),
        version: NULL_SENTINEL.to_string(),
        clean_source: source.to_string(),
        kind: SourceKind::Unknown,
    }
}

/// Try the `tfr://` registry scheme used by terragrunt.
fn try_locate_tfr(source: &str) -> Option<LocatedSource> {
    let caps = TFR_PATTERN.captures(source)?;

    let host = caps.get(1).map_or("", |m| m.as_str());
    let path = caps.get(2)?.as_str().trim_matches('/');
    let version = caps
        .get(3)
        .map_or(NULL_SENTINEL.to_string(), |m| m.as_str().to_string());

    let clean_source = if host.is_empty() || host == DEFAULT_REGISTRY {
        path.to_string()
    } else {
        format!("{host}/{path}")
    };

    Some(LocatedSource {
        name: path_basename(path),
        version,
        clean_source,
        kind: SourceKind::Registry,
    })
}

/// Try Git sources: `git::` wrapper, `git@` SSH, `.git` suffix, known hosts.
fn try_locate_git(source: &str) -> Option<LocatedSource> {
    let without_query = strip_query(source);

    let is_git = source.starts_with("git::")
        || source.starts_with("git@")
        || without_query.ends_with(".git")
        || GIT_HOSTS.iter().any(|host| source.contains(host));
    if !is_git {
        return None;
    }

    let version = GIT_REF_PATTERN
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map_or(NULL_SENTINEL.to_string(), |m| m.as_str().to_string());

    let clean_source = strip_query(source.trim_start_matches("git::")).to_string();

    Some(LocatedSource {
        name: git_repo_basename(&clean_source),
        version,
        clean_source,
        kind: SourceKind::Git,
    })
}

/// Check if a source is a local filesystem path.
fn is_local_path(source: &str) -> bool {
    source.starts_with("./") || source.starts_with("../") || source.starts_with('/')
}

/// Drop a `?query` suffix, if any.
fn strip_query(source: &str) -> &str {
    source.split('?').next().unwrap_or(source)
}

/// Last `/`-separated segment of a path.
fn path_basename(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

/// Derive a component name from a Git URL: the repository basename with a
/// leading `terraform-` prefix stripped.
fn git_repo_basename(clean: &str) -> String {
    // Cut a terraform //subdir suffix (the first "//" after the scheme)
    let scheme_end = clean.find("://").map_or(0, |i| i + 3);
    let repo_part = match clean[scheme_end..].find("//") {
        Some(i) => &clean[..scheme_end + i],
        None => clean,
    };

    let trimmed = repo_part.trim_end_matches('/').trim_end_matches(".git");
    let basename = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);

    basename
        .strip_prefix("terraform-")
        .unwrap_or(basename)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_locate_tfr_registry() {
        let located = locate("tfr:///terraform-aws-modules/vpc/aws?version=5.8.1");
        assert_eq!(located.kind, SourceKind::Registry);
        assert_eq!(located.name, "aws");
        assert_eq!(located.version, "5.8.1");
        assert_eq!(located.clean_source, "terraform-aws-modules/vpc/aws");
    }

    #[test]
    fn test_locate_tfr_without_version() {
        let located = locate("tfr:///terraform-aws-modules/eks/aws");
        assert_eq!(located.kind, SourceKind::Registry);
        assert_eq!(located.version, "Null");
        assert_eq!(located.clean_source, "terraform-aws-modules/eks/aws");
    }

    #[test]
    fn test_locate_tfr_with_custom_host() {
        let located = locate("tfr://app.terraform.io/my-org/vpc/aws?version=2.0.0");
        assert_eq!(located.kind, SourceKind::Registry);
        assert_eq!(located.clean_source, "app.terraform.io/my-org/vpc/aws");
        assert_eq!(located.version, "2.0.0");
    }

    #[test]
    fn test_locate_git_ref_extraction() {
        let located =
            locate("git::https://github.com/terraform-aws-modules/terraform-aws-vpc.git?ref=v3.14.0");
        assert_eq!(located.kind, SourceKind::Git);
        assert_eq!(located.name, "aws-vpc");
        assert_eq!(located.version, "v3.14.0");
        assert_eq!(
            located.clean_source,
            "https://github.com/terraform-aws-modules/terraform-aws-vpc.git"
        );
    }

    #[test]
    fn test_locate_git_without_ref() {
        let located = locate("git::https://example.com/infra/terraform-network.git");
        assert_eq!(located.kind, SourceKind::Git);
        assert_eq!(located.name, "network");
        assert_eq!(located.version, "Null");
    }

    #[test]
    fn test_locate_git_ssh() {
        let located = locate("git@github.com:acme/terraform-google-net.git?ref=v2.1.0");
        assert_eq!(located.kind, SourceKind::Git);
        assert_eq!(located.name, "google-net");
        assert_eq!(located.version, "v2.1.0");
    }

    #[test]
    fn test_locate_git_known_host_without_wrapper() {
        let located = locate("https://gitlab.com/acme/terraform-aws-alb");
        assert_eq!(located.kind, SourceKind::Git);
        assert_eq!(located.name, "aws-alb");
    }

    #[test]
    fn test_locate_git_with_subdir() {
        let located = locate("git::https://github.com/acme/terraform-aws-vpc.git//modules/endpoints?ref=v5.0.0");
        assert_eq!(located.kind, SourceKind::Git);
        assert_eq!(located.name, "aws-vpc");
        assert_eq!(located.version, "v5.0.0");
    }

    #[test_case("./modules/vpc", "vpc"; "current dir")]
    #[test_case("../modules/network", "network"; "parent dir")]
    #[test_case("../../shared/modules/dns", "dns"; "two levels up")]
    #[test_case("/opt/terraform/modules/iam", "iam"; "absolute")]
    fn test_locate_local(source: &str, name: &str) {
        let located = locate(source);
        assert_eq!(located.kind, SourceKind::Local);
        assert_eq!(located.version, "local");
        assert_eq!(located.name, name);
        assert_eq!(located.clean_source, source);
    }

    #[test]
    fn test_locate_registry_triple() {
        let located = locate("terraform-aws-modules/vpc/aws");
        assert_eq!(located.kind, SourceKind::Registry);
        assert_eq!(located.version, "Null");
        assert_eq!(located.clean_source, "terraform-aws-modules/vpc/aws");
    }

    #[test_case("modules/vpc"; "two segments")]
    #[test_case("a/b/c/d"; "four segments")]
    #[test_case("modules/files/archive.zip"; "file extension")]
    fn test_locate_not_a_registry_triple(source: &str) {
        assert_eq!(locate(source).kind, SourceKind::Unknown);
    }

    #[test]
    fn test_locate_http_archive() {
        let located = locate("https://example.com/dist/module.zip?checksum=abc");
        assert_eq!(located.kind, SourceKind::Http);
        assert_eq!(located.name, "module.zip");
        assert_eq!(located.clean_source, "https://example.com/dist/module.zip");
    }

    #[test]
    fn test_locate_unknown_keeps_raw_as_name() {
        let located = locate("mystery source ???");
        assert_eq!(located.kind, SourceKind::Unknown);
        assert_eq!(located.name, "mystery source ???");
    }

    #[test]
    fn test_locate_trims_whitespace() {
        let located = locate("  terraform-aws-modules/vpc/aws \n");
        assert_eq!(located.kind, SourceKind::Registry);
    }
}
