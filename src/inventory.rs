//! Inventory assembly: extraction plus provider probing per stack.
//!
//! The assembler turns a [`Discovery`] into the [`Inventory`] aggregate:
//! every stack's configuration files go through the matching extractor,
//! providers are probed (or synthesized from declared requirements when the
//! probe cannot run), and empty stacks are dropped. Parse failures are
//! recovered per file and surfaced in the scan summary log.

use std::collections::HashSet;
use std::path::Path;

use crate::config::ProbeConfig;
use crate::error::ErrorCollector;
use crate::parser::{Extractor, TerraformExtractor, TerragruntExtractor, DEFAULT_REGISTRY};
use crate::probe::ProviderProbe;
use crate::types::{ComponentGroup, Inventory, Provider, ProviderRequirement};
use crate::walker::{DiscoveredStack, Discovery};
use crate::Result;

/// Assembles an inventory from a finished project walk.
pub struct InventoryAssembler {
    probe_config: ProbeConfig,
    project_name: Option<String>,
}

impl InventoryAssembler {
    /// Create an assembler with the given probe configuration.
    #[must_use]
    pub fn new(probe_config: ProbeConfig) -> Self {
        Self {
            probe_config,
            project_name: None,
        }
    }

    /// Override the project name, which otherwise defaults to the scan
    /// root's basename.
    #[must_use]
    pub fn with_project_name(mut self, name: Option<String>) -> Self {
        self.project_name = name;
        self
    }

    /// Assemble the inventory for a discovery.
    ///
    /// Stacks without any component or provider are dropped; discovery order
    /// of the rest is preserved. Per-file parse errors are logged and
    /// skipped, never fatal.
    ///
    /// # Errors
    ///
    /// Recoverable per-file failures (parse errors, vanished files) are
    /// collected and logged; only a non-recoverable extraction error aborts
    /// the run.
    pub async fn assemble(&self, discovery: &Discovery) -> Result<Inventory> {
        let project_name = self
            .project_name
            .clone()
            .unwrap_or_else(|| root_basename(&discovery.context.root));
        let mut inventory = Inventory::new(project_name, discovery.context.kind);

        let probe = self.probe_config.enabled.then(|| {
            ProviderProbe::new(
                self.probe_config.runner,
                self.probe_config.terragrunt_args.clone(),
                self.probe_config.timeout_secs,
            )
        });

        let mut collector = ErrorCollector::new();
        for stack in &discovery.stacks {
            let mut group = ComponentGroup::new(&stack.stack);
            let mut requirements = Vec::new();

            self.extract_stack(discovery, stack, &mut group, &mut requirements, &mut collector)?;

            if let Some(probe) = &probe {
                group.providers = probe.probe_stack(&discovery.context, stack).await;
            }
            if group.providers.is_empty() && self.probe_config.declared_fallback {
                group.providers = synthesize_providers(&requirements, &stack_label(stack));
            }

            if !group.is_empty() {
                inventory.components.push(group);
            }
        }

        if !collector.is_empty() {
            tracing::warn!(
                errors = collector.count(),
                "Some configuration files could not be parsed and were skipped"
            );
        }
        tracing::info!(
            project = %inventory.project_name,
            kind = %inventory.project_type,
            stacks = inventory.components.len(),
            components = inventory.component_count(),
            providers = inventory.provider_count(),
            "Inventory assembled"
        );

        Ok(inventory)
    }

    /// Run the extractors over one stack's files.
    fn extract_stack(
        &self,
        discovery: &Discovery,
        stack: &DiscoveredStack,
        group: &mut ComponentGroup,
        requirements: &mut Vec<ProviderRequirement>,
        collector: &mut ErrorCollector,
    ) -> Result<()> {
        let label = stack_label(stack);

        for file in &stack.terraform_files {
            self.extract_file(
                &TerraformExtractor::new(),
                file,
                &discovery.context.root,
                &label,
                group,
                requirements,
                collector,
            )?;
        }
        if let Some(file) = &stack.terragrunt_file {
            self.extract_file(
                &TerragruntExtractor::new(),
                file,
                &discovery.context.root,
                &label,
                group,
                requirements,
                collector,
            )?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_file(
        &self,
        extractor: &dyn Extractor,
        file: &Path,
        root: &Path,
        stack_label: &str,
        group: &mut ComponentGroup,
        requirements: &mut Vec<ProviderRequirement>,
        collector: &mut ErrorCollector,
    ) -> Result<()> {
        let relative = file.strip_prefix(root).unwrap_or(file);
        let content = match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(file = %relative.display(), error = %e, "Cannot read file, skipping");
                collector.add(crate::err!(Io {
                    path: file.to_path_buf(),
                    source: e,
                }));
                return Ok(());
            }
        };

        match extractor.extract(&content, relative, stack_label) {
            Ok(extraction) => {
                group.components.extend(extraction.components);
                requirements.extend(extraction.provider_requirements);
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(file = %relative.display(), error = %e, "Extraction failed, skipping file");
                collector.add(e);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// Display label for a stack: its directory basename.
fn stack_label(stack: &DiscoveredStack) -> String {
    stack
        .dir
        .file_name()
        .map_or_else(|| stack.stack.clone(), |n| n.to_string_lossy().to_string())
}

fn root_basename(root: &Path) -> String {
    root.file_name()
        .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().to_string())
}

/// Build Provider records from declared `required_providers` entries.
///
/// Used when probing is disabled or produced nothing. Bare sources gain the
/// default registry host; missing sources default to the `hashicorp`
/// namespace. Constraint operators are stripped down to the version number.
fn synthesize_providers(requirements: &[ProviderRequirement], stack_label: &str) -> Vec<Provider> {
    let mut seen = HashSet::new();
    let mut providers = Vec::new();

    for requirement in requirements {
        let source = normalize_provider_source(requirement.source.as_deref(), &requirement.name);
        let version = requirement
            .constraint
            .as_deref()
            .and_then(crate::probe::constraint_version);

        let provider = Provider::new(&requirement.name, version, source, None, stack_label);
        if seen.insert(provider.dedup_key()) {
            providers.push(provider);
        }
    }

    providers
}

/// Qualify a declared provider source with the default registry host.
fn normalize_provider_source(source: Option<&str>, name: &str) -> String {
    match source {
        Some(source) if source.split('/').next().is_some_and(|host| host.contains('.')) => {
            source.to_string()
        }
        Some(source) => format!("{DEFAULT_REGISTRY}/{source}"),
        None => format!("{DEFAULT_REGISTRY}/hashicorp/{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComponentKind, ProjectKind, VersionStatus, NULL_SENTINEL};
    use crate::walker::ProjectWalker;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn probe_disabled() -> ProbeConfig {
        ProbeConfig {
            enabled: false,
            ..ProbeConfig::default()
        }
    }

    async fn assemble(root: &Path, probe: ProbeConfig) -> Inventory {
        let discovery = ProjectWalker::new(&[], false).unwrap().walk(root).unwrap();
        InventoryAssembler::new(probe)
            .assemble(&discovery)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_module_scenario() {
        let tmp = TempDir::new().unwrap();
        touch(
            tmp.path(),
            "modules/a/main.tf",
            r#"
module "x" {
  source  = "terraform-aws-modules/vpc/aws"
  version = "5.0.0"
}
"#,
        );

        let inventory = assemble(tmp.path(), probe_disabled()).await;
        assert_eq!(inventory.components.len(), 1);

        let group = &inventory.components[0];
        assert_eq!(group.stack, "modules/a");
        assert_eq!(group.components.len(), 1);

        let component = &group.components[0];
        assert_eq!(component.name, "x");
        assert_eq!(component.declared_versions, vec!["5.0.0"]);
        assert_eq!(component.status, VersionStatus::Null);
        assert_eq!(component.file, PathBuf::from("modules/a/main.tf"));
    }

    #[tokio::test]
    async fn test_project_name_defaults_to_root_basename() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("platform-infra");
        fs::create_dir(&root).unwrap();
        touch(&root, "main.tf", "module \"x\" {\n  source = \"./m\"\n}\n");

        let inventory = assemble(&root, probe_disabled()).await;
        assert_eq!(inventory.project_name, "platform-infra");
        assert_eq!(inventory.project_type, ProjectKind::Terraform);
    }

    #[tokio::test]
    async fn test_project_name_override() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "main.tf", "module \"x\" {\n  source = \"./m\"\n}\n");

        let discovery = ProjectWalker::new(&[], false)
            .unwrap()
            .walk(tmp.path())
            .unwrap();
        let inventory = InventoryAssembler::new(probe_disabled())
            .with_project_name(Some("renamed".to_string()))
            .assemble(&discovery)
            .await
            .unwrap();
        assert_eq!(inventory.project_name, "renamed");
    }

    #[tokio::test]
    async fn test_parse_error_skips_file_not_run() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "app/broken.tf", "module \"broken { source =");
        touch(
            tmp.path(),
            "app/main.tf",
            "module \"ok\" {\n  source = \"./m\"\n}\n",
        );

        let inventory = assemble(tmp.path(), probe_disabled()).await;
        assert_eq!(inventory.component_count(), 1);
        assert_eq!(inventory.components[0].components[0].name, "ok");
    }

    #[tokio::test]
    async fn test_empty_stacks_are_dropped() {
        let tmp = TempDir::new().unwrap();
        touch(
            tmp.path(),
            "app/main.tf",
            "module \"x\" {\n  source = \"./m\"\n}\n",
        );
        touch(tmp.path(), "empty/outputs.tf", "output \"id\" {\n  value = 1\n}\n");

        let inventory = assemble(tmp.path(), probe_disabled()).await;
        let stacks: Vec<&str> = inventory
            .components
            .iter()
            .map(|g| g.stack.as_str())
            .collect();
        assert_eq!(stacks, vec!["app"]);
    }

    #[tokio::test]
    async fn test_terragrunt_stack_extraction() {
        let tmp = TempDir::new().unwrap();
        touch(
            tmp.path(),
            "live/app/terragrunt.hcl",
            "terraform {\n  source = \"tfr:///terraform-aws-modules/vpc/aws?version=5.8.1\"\n}\n",
        );

        let inventory = assemble(tmp.path(), probe_disabled()).await;
        assert_eq!(inventory.project_type, ProjectKind::Terragrunt);

        let component = &inventory.components[0].components[0];
        assert_eq!(component.kind, ComponentKind::TerragruntModule);
        assert_eq!(component.declared_versions, vec!["5.8.1"]);
    }

    #[tokio::test]
    async fn test_declared_fallback_synthesizes_providers() {
        let tmp = TempDir::new().unwrap();
        touch(
            tmp.path(),
            "app/versions.tf",
            r#"
terraform {
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = ">= 4.0"
    }
    random = ">= 3.0"
  }
}

module "x" {
  source = "./m"
}
"#,
        );

        let inventory = assemble(tmp.path(), probe_disabled()).await;
        let providers = &inventory.components[0].providers;
        assert_eq!(providers.len(), 2);

        let aws = &providers[0];
        assert_eq!(aws.name, "aws");
        assert_eq!(aws.source, "registry.terraform.io/hashicorp/aws");
        assert_eq!(aws.version, "4.0");
        assert_eq!(aws.module, "Root");
        assert_eq!(aws.component, "app");

        let random = &providers[1];
        assert_eq!(random.source, "registry.terraform.io/hashicorp/random");
        assert_eq!(random.version, "3.0");
    }

    #[tokio::test]
    async fn test_fallback_disabled_yields_no_providers() {
        let tmp = TempDir::new().unwrap();
        touch(
            tmp.path(),
            "app/versions.tf",
            "terraform {\n  required_providers {\n    aws = \">= 4.0\"\n  }\n}\nmodule \"x\" {\n  source = \"./m\"\n}\n",
        );

        let probe = ProbeConfig {
            enabled: false,
            declared_fallback: false,
            ..ProbeConfig::default()
        };
        let inventory = assemble(tmp.path(), probe).await;
        assert!(inventory.components[0].providers.is_empty());
    }

    #[test]
    fn test_normalize_provider_source() {
        assert_eq!(
            normalize_provider_source(Some("hashicorp/aws"), "aws"),
            "registry.terraform.io/hashicorp/aws"
        );
        assert_eq!(
            normalize_provider_source(Some("registry.opentofu.org/hashicorp/aws"), "aws"),
            "registry.opentofu.org/hashicorp/aws"
        );
        assert_eq!(
            normalize_provider_source(None, "random"),
            "registry.terraform.io/hashicorp/random"
        );
    }

    #[test]
    fn test_synthesize_deduplicates() {
        let requirements = vec![
            ProviderRequirement {
                name: "aws".to_string(),
                source: Some("hashicorp/aws".to_string()),
                constraint: Some(">= 4.0".to_string()),
            },
            ProviderRequirement {
                name: "aws".to_string(),
                source: Some("hashicorp/aws".to_string()),
                constraint: Some(">= 4.0".to_string()),
            },
        ];
        assert_eq!(synthesize_providers(&requirements, "app").len(), 1);
    }

    #[tokio::test]
    async fn test_module_without_version_keeps_sentinels() {
        let tmp = TempDir::new().unwrap();
        touch(
            tmp.path(),
            "app/main.tf",
            "module \"net\" {\n  source = \"git::https://github.com/acme/terraform-net.git\"\n}\n",
        );

        let inventory = assemble(tmp.path(), probe_disabled()).await;
        let component = &inventory.components[0].components[0];
        assert_eq!(component.declared_versions, vec![NULL_SENTINEL]);
        assert_eq!(component.latest_version, NULL_SENTINEL);
    }
}
