//! # Vigie
//!
//! A Terraform/OpenTofu/Terragrunt inventory and upgrade-compatibility
//! engine.
//!
//! Vigie walks an infrastructure-as-code repository, extracts every module
//! and provider declaration from its HCL files, resolves the latest released
//! versions against the module/provider registries, and classifies the
//! upgrade compatibility of outdated items.
//!
//! ## Pipeline
//!
//! 1. **Walk** ([`walker`]): one pruned pass over the tree, stacks grouped
//!    by directory, project flavor inferred
//! 2. **Extract** ([`parser`], [`inventory`]): HCL decoded once per file
//!    into components and provider requirements
//! 3. **Probe** ([`probe`]): `terraform`/`tofu`/`terragrunt` providers per
//!    stack, with a declared-requirements fallback
//! 4. **Resolve** ([`registry`]): latest versions fetched in one concurrent
//!    batch, results written back in place
//! 5. **Analyze** ([`compat`]): semver delta plus schema diff per upgrade
//! 6. **Report** ([`reporter`]): JSON or YAML envelope to stdout or a file
//!
//! ## Example
//!
//! ```rust,no_run
//! use vigie::{Config, Scanner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let scanner = Scanner::new(config);
//!
//!     let mut inventory = scanner.scan_path("./infra").await?;
//!     scanner.resolve(&mut inventory).await;
//!
//!     println!("{} components", inventory.component_count());
//!     Ok(())
//! }
//! ```

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod cli;
pub mod compat;
pub mod config;
pub mod error;
pub mod inventory;
pub mod parser;
pub mod probe;
pub mod registry;
pub mod reporter;
pub mod types;
pub mod walker;

// Re-export commonly used types at crate root
pub use config::Config;
pub use error::{Result, VigieError};
pub use reporter::ReportFormat;
pub use types::{CompatibilityReport, Component, Inventory, Provider, VersionStatus};

use std::path::Path;
use std::sync::Arc;

use futures::stream::StreamExt;

use crate::compat::CompatAnalyzer;
use crate::inventory::InventoryAssembler;
use crate::parser::source::locate;
use crate::registry::{HttpRegistry, Registry, VersionResolver};
use crate::types::SourceKind;
use crate::walker::ProjectWalker;

/// Main orchestrator coordinating the walk/extract/probe/resolve pipeline.
///
/// The `Scanner` is the primary entry point for using Vigie as a library.
/// One shared HTTP registry client backs both version resolution and
/// compatibility analysis.
pub struct Scanner {
    config: Config,
    registry: Arc<dyn Registry>,
}

impl Scanner {
    /// Create a scanner with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let registry: Arc<dyn Registry> = Arc::new(HttpRegistry::new(&config.registry));
        Self { config, registry }
    }

    /// Create a scanner with an injected registry implementation.
    ///
    /// Used by tests to run the pipeline without a network.
    #[must_use]
    pub fn with_registry(config: Config, registry: Arc<dyn Registry>) -> Self {
        Self { config, registry }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Walk `path` and assemble its inventory (extraction plus probing).
    ///
    /// # Errors
    ///
    /// Returns `DirectoryNotFound` when `path` is not an existing directory;
    /// per-file parse failures are recovered and logged, never fatal.
    pub async fn scan_path<P: AsRef<Path>>(&self, path: P) -> Result<Inventory> {
        self.scan_path_named(path, None).await
    }

    /// Like [`Scanner::scan_path`] with an explicit project name.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Scanner::scan_path`].
    pub async fn scan_path_named<P: AsRef<Path>>(
        &self,
        path: P,
        project_name: Option<String>,
    ) -> Result<Inventory> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Scanning path");

        let discovery = ProjectWalker::from_config(&self.config.scan)?.walk(path)?;
        InventoryAssembler::new(self.config.probe.clone())
            .with_project_name(project_name)
            .assemble(&discovery)
            .await
    }

    /// Resolve latest versions for every component and provider in place.
    ///
    /// Per-item failures degrade that item to `Unknown`; the call itself
    /// never fails.
    pub async fn resolve(&self, inventory: &mut Inventory) {
        let batch_timeout = self
            .config
            .registry
            .batch_timeout_secs
            .map(std::time::Duration::from_secs);
        VersionResolver::new(Arc::clone(&self.registry), self.config.registry.concurrency)
            .with_batch_timeout(batch_timeout)
            .resolve(inventory)
            .await;
    }

    /// Analyze upgrade compatibility for every outdated item of a resolved
    /// inventory.
    ///
    /// Components need a registry-kind source to be analyzable; reports are
    /// deduplicated per `(subject, current, latest)` tuple. Analyses run as
    /// one concurrent batch bounded by the registry concurrency limit, and
    /// reports come back in inventory order.
    pub async fn analyze_compatibility(&self, inventory: &Inventory) -> Vec<CompatibilityReport> {
        let jobs = collect_compat_jobs(inventory);
        if jobs.is_empty() {
            return Vec::new();
        }

        let analyzer = CompatAnalyzer::new(Arc::clone(&self.registry));
        let reports: Vec<CompatibilityReport> = futures::stream::iter(jobs)
            .map(|job| {
                let analyzer = &analyzer;
                async move {
                    match job {
                        CompatJob::Module {
                            source,
                            current,
                            latest,
                        } => analyzer.analyze_module(&source, &current, Some(&latest)).await,
                        CompatJob::Provider {
                            source,
                            current,
                            latest,
                        } => {
                            analyzer
                                .analyze_provider(&source, &current, Some(&latest))
                                .await
                        }
                    }
                }
            })
            .buffered(self.config.registry.concurrency.max(1))
            .collect()
            .await;

        tracing::info!(reports = reports.len(), "Compatibility analysis finished");
        reports
    }

    /// One-off module compatibility analysis (the `compat module` command).
    pub async fn module_compat(
        &self,
        source: &str,
        current: &str,
        target: Option<&str>,
    ) -> CompatibilityReport {
        CompatAnalyzer::new(Arc::clone(&self.registry))
            .analyze_module(source, current, target)
            .await
    }

    /// One-off provider compatibility analysis (the `compat provider`
    /// command).
    pub async fn provider_compat(
        &self,
        source: &str,
        current: &str,
        target: Option<&str>,
    ) -> CompatibilityReport {
        CompatAnalyzer::new(Arc::clone(&self.registry))
            .analyze_provider(source, current, target)
            .await
    }
}

/// One compatibility analysis to run, collected up front so the whole set
/// can be fanned out as one batch.
enum CompatJob {
    Module {
        source: String,
        current: String,
        latest: String,
    },
    Provider {
        source: String,
        current: String,
        latest: String,
    },
}

/// Gather the deduplicated analysis jobs of a resolved inventory.
fn collect_compat_jobs(inventory: &Inventory) -> Vec<CompatJob> {
    let mut jobs = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for group in &inventory.components {
        for component in &group.components {
            if component.status != VersionStatus::Outdated {
                continue;
            }
            let located = locate(component.declared_source());
            if located.kind != SourceKind::Registry {
                continue;
            }
            let key = (
                located.clean_source.clone(),
                component.declared_version().to_string(),
                component.latest_version.clone(),
            );
            if !seen.insert(key) {
                continue;
            }
            jobs.push(CompatJob::Module {
                source: located.clean_source,
                current: component.declared_version().to_string(),
                latest: component.latest_version.clone(),
            });
        }

        for provider in &group.providers {
            if provider.status != VersionStatus::Outdated {
                continue;
            }
            let key = (
                provider.source.clone(),
                provider.version.clone(),
                provider.latest_version.clone(),
            );
            if !seen.insert(key) {
                continue;
            }
            jobs.push(CompatJob::Provider {
                source: provider.source.clone(),
                current: provider.version.clone(),
                latest: provider.latest_version.clone(),
            });
        }
    }

    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_creation() {
        let config = Config::default();
        let _scanner = Scanner::new(config);
    }

    #[tokio::test]
    async fn test_analyze_compatibility_skips_non_registry_sources() {
        use crate::registry::MockRegistry;
        use crate::types::{Component, ComponentGroup, ComponentKind, ProjectKind};
        use std::path::PathBuf;

        let mut registry = MockRegistry::new();
        registry.expect_module_schema().times(0);

        let mut component = Component::new(
            ComponentKind::Module,
            "net",
            Some("1.0.0".to_string()),
            Some("git::https://github.com/acme/terraform-net.git".to_string()),
            PathBuf::from("main.tf"),
        );
        component.status = VersionStatus::Outdated;
        component.latest_version = "2.0.0".to_string();

        let mut group = ComponentGroup::new("app");
        group.components.push(component);
        let mut inventory = Inventory::new("demo", ProjectKind::Terraform);
        inventory.components.push(group);

        let scanner = Scanner::with_registry(Config::default(), Arc::new(registry));
        let reports = scanner.analyze_compatibility(&inventory).await;
        assert!(reports.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_compatibility_fans_out_and_keeps_order() {
        use crate::registry::{LatestRelease, ModuleSchema, ProviderSchema};
        use crate::types::{Component, ComponentGroup, ComponentKind, ProjectKind};
        use std::path::PathBuf;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        #[derive(Default)]
        struct CountingRegistry {
            in_flight: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl crate::registry::Registry for CountingRegistry {
            async fn latest_module(
                &self,
                _: &crate::types::LocatedSource,
            ) -> crate::error::Result<LatestRelease> {
                unreachable!()
            }
            async fn latest_provider(&self, _: &str) -> crate::error::Result<LatestRelease> {
                unreachable!()
            }
            async fn module_schema(
                &self,
                _: &str,
                _: &str,
            ) -> crate::error::Result<Option<ModuleSchema>> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(None)
            }
            async fn provider_schema(
                &self,
                _: &str,
                _: &str,
            ) -> crate::error::Result<Option<ProviderSchema>> {
                Ok(None)
            }
        }

        fn outdated(name: &str, source: &str, current: &str, latest: &str) -> Component {
            let mut component = Component::new(
                ComponentKind::Module,
                name,
                Some(current.to_string()),
                Some(source.to_string()),
                PathBuf::from("main.tf"),
            );
            component.status = VersionStatus::Outdated;
            component.latest_version = latest.to_string();
            component
        }

        let mut group = ComponentGroup::new("app");
        group.components.push(outdated("vpc", "acme/vpc/aws", "1.0.0", "2.0.0"));
        group.components.push(outdated("eks", "acme/eks/aws", "19.0.0", "20.0.0"));
        let mut inventory = Inventory::new("demo", ProjectKind::Terraform);
        inventory.components.push(group);

        let registry = Arc::new(CountingRegistry::default());
        let scanner = Scanner::with_registry(
            Config::default(),
            Arc::clone(&registry) as Arc<dyn crate::registry::Registry>,
        );
        let reports = scanner.analyze_compatibility(&inventory).await;

        assert_eq!(reports.len(), 2);
        // Inventory order survives the concurrent batch.
        assert_eq!(reports[0].subject_name, "acme/vpc/aws");
        assert_eq!(reports[1].subject_name, "acme/eks/aws");
        // Schema lookups of different reports overlapped.
        assert!(registry.peak.load(Ordering::SeqCst) >= 2);
    }
}
