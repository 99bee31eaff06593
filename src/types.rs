//! Core data types for Vigie.
//!
//! This module defines the inventory data model: components (module
//! declarations), providers, stack groups, and the root `Inventory`
//! aggregate, plus the compatibility report types and the source
//! classification produced by the source locator.
//!
//! Serialized field names follow the report contract (camelCase keys,
//! literal `"Null"`/`"Root"` sentinels instead of absent keys) so report
//! writers never need defensive null-checks.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// Sentinel used for string fields whose value is not (yet) known.
pub const NULL_SENTINEL: &str = "Null";

/// Sentinel version for local filesystem sources, which are never resolvable.
pub const LOCAL_VERSION: &str = "local";

/// Sentinel for providers attributed to the top level of a stack rather than
/// to a nested `module` block.
pub const ROOT_MODULE: &str = "Root";

/// Schema version stamped on every serialized inventory.
pub const INVENTORY_VERSION: u32 = 2;

// =============================================================================
// Source classification
// =============================================================================

/// The kind of a module/provider source string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Registry source (`namespace/name/provider` or `tfr:///...`)
    Registry,
    /// Git source (`git::...`, `git@...`, `*.git`, known Git hosts)
    Git,
    /// Plain HTTP(S) source
    Http,
    /// Local filesystem path (`./`, `../`, `/`)
    Local,
    /// Anything we could not classify
    Unknown,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Registry => "registry",
            Self::Git => "git",
            Self::Http => "http",
            Self::Local => "local",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// The result of classifying a raw source string.
///
/// Produced by [`crate::parser::source::locate`]. Pure data; the only
/// behavior is resolution eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatedSource {
    /// Derived component name (e.g. repo basename for Git sources)
    pub name: String,
    /// Version extracted from the source string, or `"Null"`/`"local"`
    pub version: String,
    /// The source with scheme wrappers and query strings removed
    pub clean_source: String,
    /// Classified kind
    pub kind: SourceKind,
}

impl LocatedSource {
    /// Whether this source is even eligible for remote version resolution.
    ///
    /// Local and Unknown sources never are.
    #[must_use]
    pub fn is_resolvable(&self) -> bool {
        !matches!(self.kind, SourceKind::Local | SourceKind::Unknown)
    }
}

// =============================================================================
// Inventory model
// =============================================================================

/// The kind of declaration a component was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// A `module` block in a Terraform file
    Module,
    /// A `terraform { source = ... }` declaration in a terragrunt.hcl
    TerragruntModule,
}

/// Version currency of a component or provider after resolution.
///
/// `Null` until a resolution attempt has run; terminal afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionStatus {
    /// Declared version contains the latest released version
    Updated,
    /// A newer version exists
    Outdated,
    /// Resolution failed, or the source is local/unclassifiable
    Unknown,
    /// No resolution attempt has run yet
    #[default]
    Null,
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Updated => "Updated",
            Self::Outdated => "Outdated",
            Self::Unknown => "Unknown",
            Self::Null => "Null",
        };
        write!(f, "{s}")
    }
}

/// Project flavor inferred by the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectKind {
    /// Plain Terraform project (`.tf` files only, or nothing at all)
    Terraform,
    /// Terragrunt project (`terragrunt.hcl` files)
    Terragrunt,
    /// Mixed project with both flavors present
    TerraformTerragrunt,
    /// A single reusable module (one directory with a `version*.tf`)
    Module,
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Terraform => "terraform",
            Self::Terragrunt => "terragrunt",
            Self::TerraformTerragrunt => "terraform-terragrunt",
            Self::Module => "module",
        };
        write!(f, "{s}")
    }
}

impl ProjectKind {
    /// Whether stacks of this project are probed through terragrunt.
    #[must_use]
    pub const fn is_terragrunt_flavored(&self) -> bool {
        matches!(self, Self::Terragrunt | Self::TerraformTerragrunt)
    }
}

/// A module declaration discovered in a configuration file.
///
/// Identity is `(name, file)`. Created during extraction; only the
/// resolver mutates it afterwards (latest version, source URL, status).
///
/// # Example HCL
///
/// ```hcl
/// module "vpc" {
///   source  = "terraform-aws-modules/vpc/aws"
///   version = "5.8.1"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Declaration kind
    #[serde(rename = "type")]
    pub kind: ComponentKind,

    /// Component name (block label, or derived from the source)
    pub name: String,

    /// Declared version strings; never empty, first element authoritative
    pub declared_versions: Vec<String>,

    /// Declared source strings; never empty, first element authoritative
    pub declared_sources: Vec<String>,

    /// File the declaration came from, relative to the scan root
    pub file: PathBuf,

    /// Latest released version, or `"Null"` before/without resolution
    pub latest_version: String,

    /// Canonical source URL reported by the registry, or `"Null"`
    pub source_url: String,

    /// Version currency after resolution
    pub status: VersionStatus,
}

impl Component {
    /// Create a component in its pre-resolution state.
    ///
    /// Missing version/source values are stored as the `"Null"` sentinel so
    /// the declared lists are never empty.
    #[must_use]
    pub fn new(
        kind: ComponentKind,
        name: impl Into<String>,
        declared_version: Option<String>,
        declared_source: Option<String>,
        file: PathBuf,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            declared_versions: vec![declared_version.unwrap_or_else(|| NULL_SENTINEL.to_string())],
            declared_sources: vec![declared_source.unwrap_or_else(|| NULL_SENTINEL.to_string())],
            file,
            latest_version: NULL_SENTINEL.to_string(),
            source_url: NULL_SENTINEL.to_string(),
            status: VersionStatus::Null,
        }
    }

    /// The authoritative declared version (first list element).
    #[must_use]
    pub fn declared_version(&self) -> &str {
        self.declared_versions
            .first()
            .map_or(NULL_SENTINEL, String::as_str)
    }

    /// The authoritative declared source (first list element).
    #[must_use]
    pub fn declared_source(&self) -> &str {
        self.declared_sources
            .first()
            .map_or(NULL_SENTINEL, String::as_str)
    }

    /// Whether the component carries a version a registry lookup could be
    /// compared against.
    #[must_use]
    pub fn has_declared_version(&self) -> bool {
        let v = self.declared_version();
        !v.is_empty() && v != NULL_SENTINEL && v != LOCAL_VERSION
    }
}

/// A provider requirement attributed to a stack.
///
/// Created by the provider probe (or the declared-requirements fallback);
/// enriched by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// Provider short name (e.g. `aws`)
    pub name: String,
    /// Declared version constraint number, or `"Null"`
    pub version: String,
    /// Fully qualified source (e.g. `registry.terraform.io/hashicorp/aws`)
    pub source: String,
    /// Owning module chain (`module.vpc.module.subnet`) or `"Root"`
    pub module: String,
    /// The stack/component this provider was probed in
    pub component: String,
    /// Latest released version, or `"Null"`
    pub latest_version: String,
    /// Canonical source URL reported by the registry, or `"Null"`
    pub source_url: String,
    /// Version currency after resolution
    pub status: VersionStatus,
}

impl Provider {
    /// Create a provider in its pre-resolution state.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: Option<String>,
        source: impl Into<String>,
        module: Option<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.unwrap_or_else(|| NULL_SENTINEL.to_string()),
            source: source.into(),
            module: module.unwrap_or_else(|| ROOT_MODULE.to_string()),
            component: component.into(),
            latest_version: NULL_SENTINEL.to_string(),
            source_url: NULL_SENTINEL.to_string(),
            status: VersionStatus::Null,
        }
    }

    /// Composite key used to deduplicate providers across stacks.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!("{}|{}|{}", self.name, self.version, self.source)
    }

    /// Whether the provider carries a version a registry lookup could be
    /// compared against.
    #[must_use]
    pub fn has_declared_version(&self) -> bool {
        !self.version.is_empty() && self.version != NULL_SENTINEL
    }
}

/// All components and providers discovered in one stack directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentGroup {
    /// Stack directory, relative to the scan root (`"."` for the root itself)
    pub stack: String,
    /// Module declarations in discovery order
    pub components: Vec<Component>,
    /// Providers attributed to this stack
    pub providers: Vec<Provider>,
}

impl ComponentGroup {
    /// Create an empty group for a stack path.
    #[must_use]
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            components: Vec::new(),
            providers: Vec::new(),
        }
    }

    /// Whether the group carries neither components nor providers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.providers.is_empty()
    }
}

/// The root inventory aggregate.
///
/// Immutable snapshot once assembled; the resolver only writes back into
/// existing component/provider slots, never reorders or removes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    /// Project name (scan root basename unless overridden)
    pub project_name: String,
    /// Inferred project flavor
    pub project_type: ProjectKind,
    /// Inventory schema version
    pub version: u32,
    /// Stack groups in discovery order
    pub components: Vec<ComponentGroup>,
}

impl Inventory {
    /// Create an empty inventory for a project.
    #[must_use]
    pub fn new(project_name: impl Into<String>, project_type: ProjectKind) -> Self {
        Self {
            project_name: project_name.into(),
            project_type,
            version: INVENTORY_VERSION,
            components: Vec::new(),
        }
    }

    /// Total number of components across all stacks.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.iter().map(|g| g.components.len()).sum()
    }

    /// Total number of provider records across all stacks.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.components.iter().map(|g| g.providers.len()).sum()
    }

    /// Number of distinct providers by `name|version|source` key.
    #[must_use]
    pub fn unique_provider_count(&self) -> usize {
        let keys: HashSet<String> = self
            .components
            .iter()
            .flat_map(|g| g.providers.iter().map(Provider::dedup_key))
            .collect();
        keys.len()
    }

    /// Number of components currently carrying the given status.
    #[must_use]
    pub fn component_status_count(&self, status: VersionStatus) -> usize {
        self.components
            .iter()
            .flat_map(|g| g.components.iter())
            .filter(|c| c.status == status)
            .count()
    }
}

/// A provider requirement declared in a `required_providers` block.
///
/// Used as a probe fallback when the provider-listing tool is unavailable.
///
/// # Example HCL
///
/// ```hcl
/// terraform {
///   required_providers {
///     aws = {
///       source  = "hashicorp/aws"
///       version = ">= 4.0"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequirement {
    /// Requirement key (provider short name)
    pub name: String,
    /// Declared source, if any (`hashicorp/aws` or fully qualified)
    pub source: Option<String>,
    /// Declared version constraint, if any (`>= 4.0`)
    pub constraint: Option<String>,
}

// =============================================================================
// Compatibility model
// =============================================================================

/// Severity of a single schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSeverity {
    /// Informational, no action needed
    Info,
    /// Worth reviewing before upgrading
    Warning,
    /// Breaking, requires changes
    Error,
}

impl fmt::Display for ChangeSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// What kind of schema difference a change describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Semantic-version delta between current and latest
    VersionDelta,
    /// The current or latest version string could not be parsed
    VersionUnparsable,
    /// Module input added
    InputAdded,
    /// Module input removed
    InputRemoved,
    /// Module input type changed
    InputTypeChanged,
    /// Module input lost its default value
    InputDefaultRemoved,
    /// Module output added
    OutputAdded,
    /// Module output removed
    OutputRemoved,
    /// Module output description changed
    OutputDescriptionChanged,
    /// Module dependency or provider requirement changed
    DependencyChanged,
    /// Provider resource added
    ResourceAdded,
    /// Provider resource removed
    ResourceRemoved,
    /// Provider attribute added
    AttributeAdded,
    /// Provider attribute removed
    AttributeRemoved,
    /// Provider attribute switched between optional and required
    AttributeRequirednessChanged,
}

/// One structural difference between two schema versions. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaChange {
    /// Difference kind
    pub kind: ChangeKind,
    /// The resource/input/output the change applies to
    pub resource: String,
    /// The attribute within the resource, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Human-readable description
    pub description: String,
    /// Severity classification
    pub severity: ChangeSeverity,
    /// What the change means for the upgrade
    pub impact: String,
}

/// Overall upgrade-compatibility classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompatLevel {
    /// No breaking changes or warnings detected
    Compatible,
    /// Warnings present, upgrade with review
    MinorIssues,
    /// At least one breaking change
    BreakingChanges,
    /// Could not determine (lookup failed)
    Unknown,
}

impl fmt::Display for CompatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Compatible => "Compatible",
            Self::MinorIssues => "MinorIssues",
            Self::BreakingChanges => "BreakingChanges",
            Self::Unknown => "Unknown",
        };
        write!(f, "{s}")
    }
}

/// The outcome of analyzing one (subject, current, latest) upgrade.
///
/// Created on demand per unique tuple; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityReport {
    /// Module source or provider name the report is about
    pub subject_name: String,
    /// The version currently declared
    pub current_version: String,
    /// The version upgraded to
    pub latest_version: String,
    /// Overall classification
    pub level: CompatLevel,
    /// Breaking/error-severity changes
    pub breaking_changes: Vec<SchemaChange>,
    /// Warning-severity changes
    pub warnings: Vec<SchemaChange>,
    /// Info-severity changes (additions, new features)
    pub new_features: Vec<SchemaChange>,
    /// One-line human summary
    pub summary: String,
    /// Ordered upgrade recommendations
    pub recommendations: Vec<String>,
}

impl CompatibilityReport {
    /// Whether the report contains any breaking change.
    #[must_use]
    pub fn has_breaking_changes(&self) -> bool {
        !self.breaking_changes.is_empty()
    }
}

// =============================================================================
// Version helpers
// =============================================================================

/// Parse a version string leniently into a semantic version.
///
/// Tolerates a leading `v` and missing minor/patch components
/// (`"1.0"` parses as `1.0.0`, `"5"` as `5.0.0`).
///
/// # Errors
///
/// Returns `VigieError::VersionParse` when the normalized string still is
/// not a valid semantic version.
pub fn parse_version(version: &str) -> Result<semver::Version> {
    let cleaned = version.trim().trim_start_matches('v');

    let parts: Vec<&str> = cleaned.split('.').collect();
    let normalized = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => cleaned.to_string(),
    };

    semver::Version::parse(&normalized).map_err(|e| {
        crate::err!(VersionParse {
            version: version.to_string(),
            source: e,
        })
    })
}
