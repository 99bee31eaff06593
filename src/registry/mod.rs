//! Registry lookups: latest versions, canonical URLs and schemas.
//!
//! This module provides:
//! - The [`Registry`] trait, the single seam between the engine and the
//!   module/provider registries plus the GitHub releases API
//! - The HTTP implementation with retries and backoff
//! - The concurrent [`resolver::VersionResolver`] that enriches an inventory

mod client;
pub mod resolver;

pub use client::HttpRegistry;
pub use resolver::VersionResolver;

use serde::Deserialize;

use crate::types::LocatedSource;
use crate::Result;

/// Rate limiting configuration shared by the client and the resolver.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Concurrent in-flight lookups during batch resolution
    pub max_concurrent: usize,
    /// Initial retry delay in milliseconds
    pub delay_ms: u64,
    /// Retries per request on 5xx/429
    pub max_retries: usize,
    /// Delay multiplier between retries
    pub backoff_multiplier: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            delay_ms: 1000, // 1 second
            max_retries: 3,
            backoff_multiplier: 2.0,
        }
    }
}

/// The latest released version of a module or provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestRelease {
    /// Version string as the registry reports it
    pub version: String,
    /// Canonical source URL, when the registry reports one
    pub source_url: Option<String>,
}

/// Machine-readable module schema for one published version.
///
/// Shape follows the module registry's per-version response; every field
/// defaults to empty so partial responses still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModuleSchema {
    /// Declared input variables
    #[serde(default)]
    pub inputs: Vec<ModuleInput>,
    /// Declared outputs
    #[serde(default)]
    pub outputs: Vec<ModuleOutput>,
    /// Provider requirements
    #[serde(default)]
    pub dependencies: Vec<ModuleDependency>,
}

/// One module input variable.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModuleInput {
    /// Variable name
    pub name: String,
    /// Type expression (`string`, `list(string)`, ...)
    #[serde(rename = "type", default)]
    pub type_name: String,
    /// Whether the variable must be set by the caller
    #[serde(default)]
    pub required: bool,
    /// Default value rendered as a string, empty when none
    #[serde(default)]
    pub default: String,
    /// Documentation string
    #[serde(default)]
    pub description: String,
}

/// One module output.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModuleOutput {
    /// Output name
    pub name: String,
    /// Documentation string
    #[serde(default)]
    pub description: String,
}

/// One provider requirement of a module.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModuleDependency {
    /// Provider short name
    pub name: String,
    /// Version constraint string, empty when unconstrained
    #[serde(default)]
    pub version: String,
}

/// Machine-readable provider schema for one published version.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProviderSchema {
    /// Resources the provider exposes
    #[serde(default)]
    pub resources: Vec<ResourceSchema>,
}

/// One provider resource and its attributes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResourceSchema {
    /// Resource type name (`aws_instance`)
    pub name: String,
    /// Attribute schemas
    #[serde(default)]
    pub attributes: Vec<AttributeSchema>,
}

/// One attribute of a provider resource.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AttributeSchema {
    /// Attribute name
    pub name: String,
    /// Whether the attribute must be set
    #[serde(default)]
    pub required: bool,
}

/// Lookup operations the engine needs from version registries.
///
/// One implementation speaks HTTP; tests inject mocks so the pipeline can be
/// exercised without a network.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Latest released version of a module.
    ///
    /// Dispatches on the located source: GitHub-hosted sources go through
    /// the GitHub API, registry triples through the module registry.
    ///
    /// # Errors
    ///
    /// Returns an error when the lookup fails or the source kind cannot be
    /// resolved remotely; callers degrade the item to `Unknown`.
    async fn latest_module(&self, located: &LocatedSource) -> Result<LatestRelease>;

    /// Latest released version of a provider.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider registry lookup fails.
    async fn latest_provider(&self, source: &str) -> Result<LatestRelease>;

    /// Per-version module schema, `None` when the registry has none.
    ///
    /// # Errors
    ///
    /// Returns an error on network or decoding failures; absence of schema
    /// data is `Ok(None)`, not an error.
    async fn module_schema(&self, clean_source: &str, version: &str)
        -> Result<Option<ModuleSchema>>;

    /// Per-version provider schema, `None` when the registry has none.
    ///
    /// # Errors
    ///
    /// Returns an error on network or decoding failures; absence of schema
    /// data is `Ok(None)`, not an error.
    async fn provider_schema(&self, source: &str, version: &str)
        -> Result<Option<ProviderSchema>>;
}
