//! Concurrent version resolution across a whole inventory.
//!
//! The resolver turns every resolvable component and provider into one
//! lookup job, fans the jobs out over the shared registry client with a
//! bounded concurrency, and writes the results back into the existing
//! inventory slots. Discovery order is never disturbed; a failing lookup
//! only marks its own item `Unknown`.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::parser::source::locate;
use crate::registry::{LatestRelease, Registry};
use crate::types::{Inventory, LocatedSource, VersionStatus, LOCAL_VERSION, NULL_SENTINEL};
use crate::Result;

/// Where a lookup result is written back to.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Component { group: usize, index: usize },
    Provider { group: usize, index: usize },
}

enum Lookup {
    Module(LocatedSource),
    Provider(String),
}

/// One pending registry lookup.
struct Job {
    slot: Slot,
    declared_version: String,
    lookup: Lookup,
}

/// Resolves latest versions for all components and providers of an
/// inventory in one concurrent batch.
pub struct VersionResolver {
    registry: Arc<dyn Registry>,
    max_concurrent: usize,
    batch_timeout: Option<Duration>,
}

impl VersionResolver {
    /// Create a resolver over a shared registry client.
    ///
    /// `max_concurrent` bounds the in-flight lookups; it is clamped to at
    /// least 1.
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>, max_concurrent: usize) -> Self {
        Self {
            registry,
            max_concurrent: max_concurrent.max(1),
            batch_timeout: None,
        }
    }

    /// Bound the whole resolution batch. On expiry the batch is dropped and
    /// items without a result keep their pre-resolution state.
    #[must_use]
    pub fn with_batch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.batch_timeout = timeout;
        self
    }

    /// Resolve every component and provider in place.
    ///
    /// Items whose source is local or unclassifiable are marked `Unknown`
    /// without any network traffic. Per-item lookup failures degrade that
    /// item to `Unknown`; the call itself never fails.
    pub async fn resolve(&self, inventory: &mut Inventory) {
        let jobs = collect_jobs(inventory);
        if jobs.is_empty() {
            tracing::debug!("Nothing to resolve");
            return;
        }

        tracing::debug!(
            lookups = jobs.len(),
            concurrency = self.max_concurrent,
            "Starting batch version resolution"
        );

        let batch = stream::iter(jobs)
            .map(|job| {
                let registry = Arc::clone(&self.registry);
                async move {
                    let outcome = match &job.lookup {
                        Lookup::Module(located) => registry.latest_module(located).await,
                        Lookup::Provider(source) => registry.latest_provider(source).await,
                    };
                    (job.slot, job.declared_version, outcome)
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect::<Vec<(Slot, String, Result<LatestRelease>)>>();

        let results = match self.batch_timeout {
            Some(limit) => match tokio::time::timeout(limit, batch).await {
                Ok(results) => results,
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = limit.as_secs(),
                        "Batch version resolution timed out, items left unresolved"
                    );
                    return;
                }
            },
            None => batch.await,
        };

        let mut resolved = 0_usize;
        let mut failed = 0_usize;
        for (slot, declared_version, outcome) in results {
            match outcome {
                Ok(release) => {
                    resolved += 1;
                    write_back(inventory, slot, &release, &declared_version);
                }
                Err(e) => {
                    failed += 1;
                    tracing::debug!(error = %e, "Version lookup failed, marking item Unknown");
                    set_status(inventory, slot, VersionStatus::Unknown);
                }
            }
        }

        tracing::info!(resolved, failed, "Batch version resolution finished");
    }
}

/// Build the job list, pre-marking unresolvable items `Unknown`.
fn collect_jobs(inventory: &mut Inventory) -> Vec<Job> {
    let mut jobs = Vec::new();

    for (g, group) in inventory.components.iter_mut().enumerate() {
        for (i, component) in group.components.iter_mut().enumerate() {
            let located = locate(component.declared_source());
            if !located.is_resolvable() || has_relative_segments(&located.clean_source) {
                tracing::debug!(
                    component = %component.name,
                    kind = %located.kind,
                    "Source not resolvable, skipping lookup"
                );
                component.status = VersionStatus::Unknown;
                continue;
            }
            jobs.push(Job {
                slot: Slot::Component { group: g, index: i },
                declared_version: component.declared_version().to_string(),
                lookup: Lookup::Module(located),
            });
        }

        for (i, provider) in group.providers.iter_mut().enumerate() {
            if provider.source.is_empty() || provider.source == NULL_SENTINEL {
                provider.status = VersionStatus::Unknown;
                continue;
            }
            jobs.push(Job {
                slot: Slot::Provider { group: g, index: i },
                declared_version: provider.version.clone(),
                lookup: Lookup::Provider(provider.source.clone()),
            });
        }
    }

    jobs
}

/// Write one successful lookup back into its inventory slot.
fn write_back(inventory: &mut Inventory, slot: Slot, release: &LatestRelease, declared: &str) {
    let status = classify(declared, &release.version);
    let source_url = release
        .source_url
        .clone()
        .unwrap_or_else(|| NULL_SENTINEL.to_string());

    match slot {
        Slot::Component { group, index } => {
            let component = &mut inventory.components[group].components[index];
            component.latest_version = release.version.clone();
            component.source_url = source_url;
            component.status = status;
        }
        Slot::Provider { group, index } => {
            let provider = &mut inventory.components[group].providers[index];
            provider.latest_version = release.version.clone();
            provider.source_url = source_url;
            provider.status = status;
        }
    }
}

fn set_status(inventory: &mut Inventory, slot: Slot, status: VersionStatus) {
    match slot {
        Slot::Component { group, index } => {
            inventory.components[group].components[index].status = status;
        }
        Slot::Provider { group, index } => {
            inventory.components[group].providers[index].status = status;
        }
    }
}

/// Classify version currency with the loose containment comparison.
///
/// `Updated` means the resolved latest version appears as a substring of the
/// declared version string, which tolerates `v` prefixes and constraint
/// operators. It can false-positive: latest `1.0` also matches a declared
/// `1.10.0`. Kept as-is for parity with existing inventories.
fn classify(declared: &str, latest: &str) -> VersionStatus {
    if declared.is_empty() || declared == NULL_SENTINEL || declared == LOCAL_VERSION {
        return VersionStatus::Unknown;
    }
    if declared.contains(latest) {
        VersionStatus::Updated
    } else {
        VersionStatus::Outdated
    }
}

/// Whether a source path carries `.`/`..` segments.
///
/// Catches filesystem-relative sources that evade the leading `./`
/// classification check, such as `foo/../modules/vpc`. Those must never be
/// sent to a registry.
fn has_relative_segments(source: &str) -> bool {
    source.split('/').any(|segment| segment == "." || segment == "..")
}
