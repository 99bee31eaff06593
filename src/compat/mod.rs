//! Upgrade-compatibility analysis.
//!
//! For a `(subject, current, latest)` version pair, the analyzer combines a
//! semantic-version delta heuristic with a structural diff of the registry's
//! per-version schemas, and rolls the result up into a
//! [`CompatibilityReport`] with a level, a summary, and ordered
//! recommendations.
//!
//! # Analysis steps
//!
//! 1. Same-version input short-circuits to `Compatible` with no network
//!    calls.
//! 2. Both versions are parsed leniently as semver; the delta classifies a
//!    baseline change (major = breaking, minor = warning, patch = info).
//!    Unparsable versions are treated conservatively as a major change.
//! 3. When the registry exposes machine-readable schemas for both versions,
//!    their inputs/outputs/dependencies (modules) or resources/attributes
//!    (providers) are diffed; see [`module`] and [`provider`].
//! 4. Without schema data the heuristic stands alone; the report never
//!    silently claims compatibility.
//!
//! Reports are cached per `(subject, current, latest)` tuple, so repeated
//! analyses of the same upgrade across stacks cost one lookup.

mod module;
mod provider;

use std::sync::Arc;

use dashmap::DashMap;

use crate::registry::Registry;
use crate::types::{
    parse_version, ChangeKind, ChangeSeverity, CompatLevel, CompatibilityReport, SchemaChange,
};

/// What flavor of subject an analysis is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subject {
    Module,
    Provider,
}

/// Analyzes upgrade compatibility through a shared registry client.
pub struct CompatAnalyzer {
    registry: Arc<dyn Registry>,
    cache: DashMap<(String, String, String), CompatibilityReport>,
}

impl CompatAnalyzer {
    /// Create an analyzer over a shared registry client.
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
        }
    }

    /// Analyze upgrading a module from `current` to `target`.
    ///
    /// `source` is the clean registry source (`ns/name/provider`). When
    /// `target` is `None` the latest released version is looked up first; a
    /// failing lookup yields an `Unknown`-level report instead of an error.
    pub async fn analyze_module(
        &self,
        source: &str,
        current: &str,
        target: Option<&str>,
    ) -> CompatibilityReport {
        let latest = match target {
            Some(v) => v.to_string(),
            None => {
                let located = crate::parser::source::locate(source);
                match self.registry.latest_module(&located).await {
                    Ok(release) => release.version,
                    Err(e) => return unknown_report(source, current, &e),
                }
            }
        };
        self.analyze(Subject::Module, source, current, &latest).await
    }

    /// Analyze upgrading a provider from `current` to `target`.
    ///
    /// `source` is the fully qualified or bare provider source
    /// (`hashicorp/aws`). When `target` is `None` the latest released
    /// version is looked up first.
    pub async fn analyze_provider(
        &self,
        source: &str,
        current: &str,
        target: Option<&str>,
    ) -> CompatibilityReport {
        let latest = match target {
            Some(v) => v.to_string(),
            None => match self.registry.latest_provider(source).await {
                Ok(release) => release.version,
                Err(e) => return unknown_report(source, current, &e),
            },
        };
        self.analyze(Subject::Provider, source, current, &latest)
            .await
    }

    async fn analyze(
        &self,
        subject: Subject,
        source: &str,
        current: &str,
        latest: &str,
    ) -> CompatibilityReport {
        if current == latest {
            return already_latest(source, current);
        }

        let key = (
            source.to_string(),
            current.to_string(),
            latest.to_string(),
        );
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(source, current, latest, "Compatibility report served from cache");
            return cached.clone();
        }

        let mut changes = version_delta_changes(current, latest);
        changes.extend(self.schema_changes(subject, source, current, latest).await);

        let report = build_report(source, current, latest, changes);
        self.cache.insert(key, report.clone());
        report
    }

    /// Diff the per-version schemas when both are obtainable.
    ///
    /// The two versions are fetched concurrently. Lookup failures and absent
    /// schema data both degrade to an empty change list; the version-delta
    /// heuristic still applies.
    async fn schema_changes(
        &self,
        subject: Subject,
        source: &str,
        current: &str,
        latest: &str,
    ) -> Vec<SchemaChange> {
        match subject {
            Subject::Module => {
                let (old, new) = tokio::join!(
                    self.registry.module_schema(source, current),
                    self.registry.module_schema(source, latest),
                );
                match (old, new) {
                    (Ok(Some(old)), Ok(Some(new))) => module::diff(&old, &new),
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::debug!(source, error = %e, "Module schema unavailable, heuristic only");
                        Vec::new()
                    }
                    _ => Vec::new(),
                }
            }
            Subject::Provider => {
                let (old, new) = tokio::join!(
                    self.registry.provider_schema(source, current),
                    self.registry.provider_schema(source, latest),
                );
                match (old, new) {
                    (Ok(Some(old)), Ok(Some(new))) => provider::diff(&old, &new),
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::debug!(source, error = %e, "Provider schema unavailable, heuristic only");
                        Vec::new()
                    }
                    _ => Vec::new(),
                }
            }
        }
    }
}

/// Classify the semver delta between two versions.
///
/// Unparsable versions are treated as a major change with a dedicated
/// warning explaining the ambiguity.
fn version_delta_changes(current: &str, latest: &str) -> Vec<SchemaChange> {
    let (cur, lat) = match (parse_version(current), parse_version(latest)) {
        (Ok(c), Ok(l)) => (c, l),
        _ => {
            return vec![
                SchemaChange {
                    kind: ChangeKind::VersionUnparsable,
                    resource: "version".to_string(),
                    attribute: None,
                    description: format!(
                        "Cannot compare '{current}' and '{latest}' as semantic versions"
                    ),
                    severity: ChangeSeverity::Warning,
                    impact: "Treating the upgrade as a major change; verify manually".to_string(),
                },
                SchemaChange {
                    kind: ChangeKind::VersionDelta,
                    resource: "version".to_string(),
                    attribute: None,
                    description: format!("Assumed major version change: {current} -> {latest}"),
                    severity: ChangeSeverity::Error,
                    impact: "Review the changelog before upgrading".to_string(),
                },
            ];
        }
    };

    let (severity, impact) = if lat.major != cur.major {
        (
            ChangeSeverity::Error,
            "Major version change, review the changelog before upgrading",
        )
    } else if lat.minor != cur.minor {
        (
            ChangeSeverity::Warning,
            "Minor version change, new functionality may alter defaults",
        )
    } else {
        (
            ChangeSeverity::Info,
            "Patch-level change, expected to be safe",
        )
    };

    vec![SchemaChange {
        kind: ChangeKind::VersionDelta,
        resource: "version".to_string(),
        attribute: None,
        description: format!("Version change: {current} -> {latest}"),
        severity,
        impact: impact.to_string(),
    }]
}

/// Bucket changes by severity and roll up the overall level.
fn build_report(
    source: &str,
    current: &str,
    latest: &str,
    changes: Vec<SchemaChange>,
) -> CompatibilityReport {
    let mut breaking_changes = Vec::new();
    let mut warnings = Vec::new();
    let mut new_features = Vec::new();
    for change in changes {
        match change.severity {
            ChangeSeverity::Error => breaking_changes.push(change),
            ChangeSeverity::Warning => warnings.push(change),
            ChangeSeverity::Info => new_features.push(change),
        }
    }

    let level = if !breaking_changes.is_empty() {
        CompatLevel::BreakingChanges
    } else if !warnings.is_empty() {
        CompatLevel::MinorIssues
    } else {
        CompatLevel::Compatible
    };

    let summary = match level {
        CompatLevel::BreakingChanges => format!(
            "Upgrading {source} from {current} to {latest} has {} breaking change(s)",
            breaking_changes.len()
        ),
        CompatLevel::MinorIssues => format!(
            "Upgrading {source} from {current} to {latest} has {} warning(s)",
            warnings.len()
        ),
        _ => format!("Upgrading {source} from {current} to {latest} looks compatible"),
    };

    let mut recommendations = Vec::new();
    if !breaking_changes.is_empty() {
        recommendations.push("Review each breaking change and adjust your configuration".to_string());
        recommendations.push("Test the upgrade in a non-production workspace first".to_string());
    }
    if !warnings.is_empty() {
        recommendations.push("Read the release notes for behavior changes".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("Run a plan after upgrading to confirm no drift".to_string());
    }

    CompatibilityReport {
        subject_name: source.to_string(),
        current_version: current.to_string(),
        latest_version: latest.to_string(),
        level,
        breaking_changes,
        warnings,
        new_features,
        summary,
        recommendations,
    }
}

fn already_latest(source: &str, version: &str) -> CompatibilityReport {
    CompatibilityReport {
        subject_name: source.to_string(),
        current_version: version.to_string(),
        latest_version: version.to_string(),
        level: CompatLevel::Compatible,
        breaking_changes: Vec::new(),
        warnings: Vec::new(),
        new_features: Vec::new(),
        summary: format!("{source} is already at the latest version ({version})"),
        recommendations: Vec::new(),
    }
}

fn unknown_report(
    source: &str,
    current: &str,
    error: &crate::error::VigieError,
) -> CompatibilityReport {
    CompatibilityReport {
        subject_name: source.to_string(),
        current_version: current.to_string(),
        latest_version: crate::types::NULL_SENTINEL.to_string(),
        level: CompatLevel::Unknown,
        breaking_changes: Vec::new(),
        warnings: Vec::new(),
        new_features: Vec::new(),
        summary: format!("Could not determine the latest version of {source}: {error}"),
        recommendations: vec!["Re-run with network access to the registry".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        LatestRelease, MockRegistry, ModuleInput, ModuleSchema, ProviderSchema,
    };

    fn analyzer(registry: MockRegistry) -> CompatAnalyzer {
        CompatAnalyzer::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_same_version_short_circuits() {
        let mut registry = MockRegistry::new();
        registry.expect_latest_module().times(0);
        registry.expect_module_schema().times(0);

        let report = analyzer(registry)
            .analyze_module("acme/vpc/aws", "5.0.0", Some("5.0.0"))
            .await;

        assert_eq!(report.level, CompatLevel::Compatible);
        assert!(report.summary.contains("already at the latest"));
    }

    #[tokio::test]
    async fn test_major_delta_is_breaking() {
        let mut registry = MockRegistry::new();
        registry.expect_module_schema().returning(|_, _| Ok(None));

        let report = analyzer(registry)
            .analyze_module("acme/eks/aws", "19.21.0", Some("20.0.0"))
            .await;

        assert_eq!(report.level, CompatLevel::BreakingChanges);
        assert!(!report.breaking_changes.is_empty());
        assert!(report.summary.contains("breaking"));
    }

    #[tokio::test]
    async fn test_patch_delta_without_schemas_is_compatible() {
        let mut registry = MockRegistry::new();
        registry.expect_module_schema().returning(|_, _| Ok(None));

        let report = analyzer(registry)
            .analyze_module("acme/vpc/aws", "1.2.0", Some("1.2.1"))
            .await;

        assert_eq!(report.level, CompatLevel::Compatible);
        assert_eq!(report.new_features.len(), 1);
    }

    #[tokio::test]
    async fn test_unparsable_version_is_conservative() {
        let mut registry = MockRegistry::new();
        registry.expect_provider_schema().returning(|_, _| Ok(None));

        let report = analyzer(registry)
            .analyze_provider("hashicorp/aws", "~> 4.x", Some("5.0.0"))
            .await;

        assert_eq!(report.level, CompatLevel::BreakingChanges);
        assert!(report
            .warnings
            .iter()
            .any(|c| c.kind == ChangeKind::VersionUnparsable));
    }

    #[tokio::test]
    async fn test_schema_diff_feeds_report() {
        let mut registry = MockRegistry::new();
        registry.expect_module_schema().returning(|_, version| {
            let mut schema = ModuleSchema::default();
            if version == "2.0.0" {
                schema.inputs.push(ModuleInput {
                    name: "vpc_id".to_string(),
                    type_name: "string".to_string(),
                    required: true,
                    ..ModuleInput::default()
                });
            }
            Ok(Some(schema))
        });

        let report = analyzer(registry)
            .analyze_module("acme/app/aws", "1.9.0", Some("2.0.0"))
            .await;

        assert_eq!(report.level, CompatLevel::BreakingChanges);
        assert!(report
            .breaking_changes
            .iter()
            .any(|c| c.kind == ChangeKind::InputAdded && c.resource == "vpc_id"));
    }

    #[tokio::test]
    async fn test_latest_lookup_failure_is_unknown() {
        let mut registry = MockRegistry::new();
        registry.expect_latest_provider().returning(|_| {
            Err(crate::err!(Http {
                message: "registry unreachable".to_string(),
                status_code: None,
            }))
        });

        let report = analyzer(registry)
            .analyze_provider("hashicorp/aws", "4.0.0", None)
            .await;

        assert_eq!(report.level, CompatLevel::Unknown);
        assert!(report.summary.contains("Could not determine"));
    }

    #[tokio::test]
    async fn test_cache_avoids_repeat_lookups() {
        let mut registry = MockRegistry::new();
        registry
            .expect_module_schema()
            .times(2) // once per version, first analysis only
            .returning(|_, _| Ok(Some(ModuleSchema::default())));

        let analyzer = analyzer(registry);
        let first = analyzer
            .analyze_module("acme/vpc/aws", "1.0.0", Some("1.1.0"))
            .await;
        let second = analyzer
            .analyze_module("acme/vpc/aws", "1.0.0", Some("1.1.0"))
            .await;

        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schema_versions_fetched_together() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        #[derive(Default)]
        struct CountingRegistry {
            in_flight: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl Registry for CountingRegistry {
            async fn latest_module(
                &self,
                _: &crate::types::LocatedSource,
            ) -> crate::Result<LatestRelease> {
                unreachable!()
            }
            async fn latest_provider(&self, _: &str) -> crate::Result<LatestRelease> {
                unreachable!()
            }
            async fn module_schema(
                &self,
                _: &str,
                _: &str,
            ) -> crate::Result<Option<ModuleSchema>> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(ModuleSchema::default()))
            }
            async fn provider_schema(
                &self,
                _: &str,
                _: &str,
            ) -> crate::Result<Option<ProviderSchema>> {
                Ok(None)
            }
        }

        let registry = Arc::new(CountingRegistry::default());
        let analyzer = CompatAnalyzer::new(Arc::clone(&registry) as Arc<dyn Registry>);
        let report = analyzer
            .analyze_module("acme/vpc/aws", "1.0.0", Some("1.1.0"))
            .await;

        assert_eq!(report.level, CompatLevel::MinorIssues);
        // Both versions' schema lookups were in flight at the same time.
        assert_eq!(registry.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_schema_diff() {
        use crate::registry::{AttributeSchema, ResourceSchema};

        let mut registry = MockRegistry::new();
        registry.expect_provider_schema().returning(|_, version| {
            let mut schema = ProviderSchema::default();
            if version == "4.0.0" {
                schema.resources.push(ResourceSchema {
                    name: "aws_legacy_thing".to_string(),
                    attributes: vec![AttributeSchema {
                        name: "arn".to_string(),
                        required: false,
                    }],
                });
            }
            Ok(Some(schema))
        });

        let report = analyzer(registry)
            .analyze_provider("hashicorp/aws", "4.0.0", Some("4.1.0"))
            .await;

        assert_eq!(report.level, CompatLevel::BreakingChanges);
        assert!(report
            .breaking_changes
            .iter()
            .any(|c| c.kind == ChangeKind::ResourceRemoved));
    }
}
