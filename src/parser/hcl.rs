//! HCL extraction for Terraform and Terragrunt configuration files.
//!
//! Each file's body is decoded exactly once into a list of [`RawBlock`]
//! values; the extractors then map those onto [`Component`] and
//! [`ProviderRequirement`] records. Terragrunt files additionally get a
//! regex fallback so that a file the HCL parser rejects (interpolation-heavy
//! or half-edited) can still surface its `terraform { source = ... }`
//! declaration.

use std::path::Path;
use std::sync::LazyLock;

use hcl::{Body, Expression};
use regex::Regex;

use crate::parser::source;
use crate::types::{Component, ComponentKind, ProviderRequirement};
use crate::Result;

/// Matches the opener of a `terraform { ... }` block.
static TERRAFORM_BLOCK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"terraform\s*\{").expect("Invalid regex"));

/// Matches a quoted `source = "..."` attribute.
static SOURCE_ATTR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"source\s*=\s*"([^"]+)""#).expect("Invalid regex"));

/// One top-level HCL structure in a decoded form the extractors understand.
///
/// Decoding happens once per file; everything downstream matches on these
/// variants instead of re-walking the HCL AST.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBlock {
    /// A `module "name" { source, version }` declaration.
    Module {
        /// Block label, `"unnamed"` when absent
        name: String,
        /// `source` attribute, when present and literal
        source: Option<String>,
        /// `version` attribute, when present and literal
        version: Option<String>,
    },
    /// A `terraform { source = ... }` declaration (Terragrunt).
    TerraformSource {
        /// The literal source string
        source: String,
    },
    /// The `required_providers` entries of a `terraform` block.
    Providers(Vec<ProviderRequirement>),
    /// Anything else (resources, variables, locals, ...).
    Unrecognized,
}

/// Everything extracted from a single configuration file.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Module components declared in the file
    pub components: Vec<Component>,
    /// Declared provider requirements (`required_providers` entries)
    pub provider_requirements: Vec<ProviderRequirement>,
}

/// Extractor for Terraform/OpenTofu files (`.tf`, `.tf.json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformExtractor;

impl TerraformExtractor {
    /// Create a new Terraform extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl super::Extractor for TerraformExtractor {
    fn extract(&self, content: &str, file: &Path, _stack_name: &str) -> Result<Extraction> {
        let mut extraction = Extraction::default();

        for block in decode_content(content, file)? {
            match block {
                RawBlock::Module {
                    name,
                    source,
                    version,
                } => {
                    extraction.components.push(Component::new(
                        ComponentKind::Module,
                        name,
                        version,
                        source,
                        file.to_path_buf(),
                    ));
                }
                RawBlock::Providers(requirements) => {
                    extraction.provider_requirements.extend(requirements);
                }
                // A terraform source attribute has no meaning in plain
                // Terraform files.
                RawBlock::TerraformSource { .. } | RawBlock::Unrecognized => {}
            }
        }

        Ok(extraction)
    }
}

/// Extractor for Terragrunt stack definitions (`terragrunt.hcl`).
///
/// Works in two stages: a structured HCL parse first, then a regex scan of
/// the raw text when the parse fails. Only when both stages come up empty
/// does the file count as unparseable.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerragruntExtractor;

impl TerragruntExtractor {
    /// Create a new Terragrunt extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Structured stage: decode the HCL body and pick the first
    /// `terraform { source = ... }` declaration.
    ///
    /// `Ok(None)` means the file parsed fine but declares no source (a root
    /// terragrunt.hcl holding only `remote_state`, for example).
    fn try_structured(&self, content: &str, file: &Path) -> Result<Option<String>> {
        for block in decode_content(content, file)? {
            if let RawBlock::TerraformSource { source } = block {
                return Ok(Some(source));
            }
        }
        Ok(None)
    }

    /// Fallback stage: locate a `terraform {` opener in the raw text and the
    /// first quoted `source = "..."` after it.
    fn try_regex(&self, content: &str) -> Option<String> {
        let block_start = TERRAFORM_BLOCK_PATTERN.find(content)?.end();
        SOURCE_ATTR_PATTERN
            .captures(&content[block_start..])
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl super::Extractor for TerragruntExtractor {
    fn extract(&self, content: &str, file: &Path, stack_name: &str) -> Result<Extraction> {
        let found = match self.try_structured(content, file) {
            Ok(found) => found,
            Err(e) => match self.try_regex(content) {
                Some(source) => {
                    tracing::debug!(
                        file = %file.display(),
                        "Structured HCL parse failed, recovered source via regex fallback"
                    );
                    Some(source)
                }
                None => return Err(e),
            },
        };

        let mut extraction = Extraction::default();
        let Some(raw_source) = found else {
            tracing::debug!(file = %file.display(), "No terraform source declaration found");
            return Ok(extraction);
        };

        let located = source::locate(&raw_source);
        let name = if located.name.trim().is_empty() {
            stack_name.to_string()
        } else {
            located.name
        };

        extraction.components.push(Component::new(
            ComponentKind::TerragruntModule,
            name,
            Some(located.version),
            Some(raw_source),
            file.to_path_buf(),
        ));

        Ok(extraction)
    }
}

/// Parse HCL content and decode every top-level structure into a [`RawBlock`].
fn decode_content(content: &str, file: &Path) -> Result<Vec<RawBlock>> {
    let body: Body = hcl::from_str(content).map_err(|e| {
        crate::err!(HclParse {
            file: file.to_path_buf(),
            message: e.to_string(),
            line: None,
            column: None,
        })
    })?;

    let mut blocks = Vec::new();
    for structure in body.into_inner() {
        match structure {
            hcl::Structure::Block(block) => match block.identifier.as_str() {
                "module" => blocks.push(decode_module_block(&block)),
                "terraform" => decode_terraform_block(&block, &mut blocks),
                _ => blocks.push(RawBlock::Unrecognized),
            },
            hcl::Structure::Attribute(_) => blocks.push(RawBlock::Unrecognized),
        }
    }

    Ok(blocks)
}

/// Decode a `module "name" { ... }` block.
fn decode_module_block(block: &hcl::Block) -> RawBlock {
    let name = block
        .labels
        .first()
        .map_or_else(|| "unnamed".to_string(), |label| label.as_str().to_string());

    RawBlock::Module {
        name,
        source: get_string_attribute(&block.body, "source"),
        version: get_string_attribute(&block.body, "version"),
    }
}

/// Decode a `terraform { ... }` block.
///
/// One block can yield up to two entries: a source declaration (Terragrunt)
/// and the `required_providers` requirements (Terraform).
fn decode_terraform_block(block: &hcl::Block, out: &mut Vec<RawBlock>) {
    let mut recognized = false;

    if let Some(source) = get_string_attribute(&block.body, "source") {
        out.push(RawBlock::TerraformSource { source });
        recognized = true;
    }

    let mut requirements = Vec::new();
    for structure in block.body.clone().into_inner() {
        if let hcl::Structure::Block(nested_block) = &structure {
            if nested_block.identifier.as_str() == "required_providers" {
                for attr in nested_block.body.attributes() {
                    requirements.push(decode_provider_requirement(attr.key.as_str(), &attr.expr));
                }
            }
        }
    }
    if !requirements.is_empty() {
        out.push(RawBlock::Providers(requirements));
        recognized = true;
    }

    if !recognized {
        out.push(RawBlock::Unrecognized);
    }
}

/// Decode one `required_providers` entry.
fn decode_provider_requirement(name: &str, expr: &Expression) -> ProviderRequirement {
    match expr {
        // Simple string constraint, pre-0.13 terraform legacy form eg.
        // terraform {
        //   required_providers {
        //     aws = ">= 4.0"
        //   }
        // }
        Expression::String(constraint) => ProviderRequirement {
            name: name.to_string(),
            source: None,
            constraint: Some(constraint.clone()),
        },

        // Object with source and version
        Expression::Object(obj) => {
            let mut source = None;
            let mut constraint = None;

            for (key, value) in obj {
                match object_key_to_string(key).as_str() {
                    "source" => {
                        source = expression_to_string(value);
                    }
                    "version" => {
                        constraint = expression_to_string(value);
                    }
                    _ => {
                        // Ignore other attributes (configuration_aliases, etc.)
                    }
                }
            }

            ProviderRequirement {
                name: name.to_string(),
                source,
                constraint,
            }
        }

        _ => ProviderRequirement {
            name: name.to_string(),
            source: None,
            constraint: None,
        },
    }
}

/// Get a string attribute from a body.
fn get_string_attribute(body: &Body, key: &str) -> Option<String> {
    body.attributes()
        .find(|attr| attr.key.as_str() == key)
        .and_then(|attr| expression_to_string(&attr.expr))
}

/// Convert an expression to a string if possible.
///
/// Interpolated values (`"${...}"`) yield `None`: there is no literal string
/// to record, and nothing downstream could resolve one anyway.
fn expression_to_string(expr: &Expression) -> Option<String> {
    match expr {
        Expression::String(s) => Some(s.clone()),
        Expression::Number(n) => Some(n.to_string()),
        Expression::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Convert an object key to a string.
fn object_key_to_string(key: &hcl::ObjectKey) -> String {
    match key {
        hcl::ObjectKey::Identifier(id) => id.as_str().to_string(),
        hcl::ObjectKey::Expression(expr) => expression_to_string(expr).unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Extractor;
    use crate::types::{LOCAL_VERSION, NULL_SENTINEL};

    fn extract_terraform(content: &str) -> Extraction {
        TerraformExtractor::new()
            .extract(content, Path::new("main.tf"), "root")
            .unwrap()
    }

    fn extract_terragrunt(content: &str) -> Result<Extraction> {
        TerragruntExtractor::new().extract(content, Path::new("stacks/app/terragrunt.hcl"), "app")
    }

    #[test]
    fn test_extract_simple_module() {
        let extraction = extract_terraform(
            r#"
module "vpc" {
  source  = "terraform-aws-modules/vpc/aws"
  version = "5.8.1"
}
"#,
        );

        assert_eq!(extraction.components.len(), 1);
        let component = &extraction.components[0];
        assert_eq!(component.kind, ComponentKind::Module);
        assert_eq!(component.name, "vpc");
        assert_eq!(component.declared_versions, vec!["5.8.1"]);
        assert_eq!(
            component.declared_sources,
            vec!["terraform-aws-modules/vpc/aws"]
        );
        assert_eq!(component.latest_version, NULL_SENTINEL);
    }

    #[test]
    fn test_extract_module_without_version() {
        let extraction = extract_terraform(
            r#"
module "network" {
  source = "git::https://github.com/acme/terraform-network.git"
}
"#,
        );

        assert_eq!(extraction.components.len(), 1);
        assert_eq!(
            extraction.components[0].declared_versions,
            vec![NULL_SENTINEL]
        );
    }

    #[test]
    fn test_extract_module_without_source() {
        let extraction = extract_terraform(
            r#"
module "odd" {
  count = 2
}
"#,
        );

        assert_eq!(extraction.components.len(), 1);
        assert_eq!(
            extraction.components[0].declared_sources,
            vec![NULL_SENTINEL]
        );
    }

    #[test]
    fn test_extract_multiple_modules() {
        let extraction = extract_terraform(
            r#"
module "vpc" {
  source  = "terraform-aws-modules/vpc/aws"
  version = "5.8.1"
}

module "eks" {
  source  = "terraform-aws-modules/eks/aws"
  version = "20.8.4"
}

module "local_tags" {
  source = "./modules/tags"
}
"#,
        );

        let names: Vec<&str> = extraction
            .components
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["vpc", "eks", "local_tags"]);
    }

    #[test]
    fn test_extract_required_providers_object_form() {
        let extraction = extract_terraform(
            r#"
terraform {
  required_version = ">= 1.5"

  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = ">= 4.0"
    }
    random = {
      source = "hashicorp/random"
    }
  }
}
"#,
        );

        assert!(extraction.components.is_empty());
        assert_eq!(extraction.provider_requirements.len(), 2);

        let aws = &extraction.provider_requirements[0];
        assert_eq!(aws.name, "aws");
        assert_eq!(aws.source.as_deref(), Some("hashicorp/aws"));
        assert_eq!(aws.constraint.as_deref(), Some(">= 4.0"));

        let random = &extraction.provider_requirements[1];
        assert_eq!(random.name, "random");
        assert_eq!(random.constraint, None);
    }

    #[test]
    fn test_extract_legacy_provider_constraint() {
        let extraction = extract_terraform(
            r#"
terraform {
  required_providers {
    aws = ">= 4.0"
  }
}
"#,
        );

        assert_eq!(extraction.provider_requirements.len(), 1);
        let aws = &extraction.provider_requirements[0];
        assert_eq!(aws.source, None);
        assert_eq!(aws.constraint.as_deref(), Some(">= 4.0"));
    }

    #[test]
    fn test_extract_ignores_unrelated_blocks() {
        let extraction = extract_terraform(
            r#"
resource "aws_instance" "web" {
  ami = "ami-12345"
}

variable "region" {
  default = "eu-west-1"
}
"#,
        );

        assert!(extraction.components.is_empty());
        assert!(extraction.provider_requirements.is_empty());
    }

    #[test]
    fn test_extract_invalid_hcl_is_error() {
        let result = TerraformExtractor::new().extract(
            "module \"broken { source =",
            Path::new("main.tf"),
            "root",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_terragrunt_registry_source() {
        let extraction = extract_terragrunt(
            r#"
terraform {
  source = "tfr:///terraform-aws-modules/vpc/aws?version=5.8.1"
}

inputs = {
  cidr = "10.0.0.0/16"
}
"#,
        )
        .unwrap();

        assert_eq!(extraction.components.len(), 1);
        let component = &extraction.components[0];
        assert_eq!(component.kind, ComponentKind::TerragruntModule);
        assert_eq!(component.name, "aws");
        assert_eq!(component.declared_versions, vec!["5.8.1"]);
        assert_eq!(
            component.declared_sources,
            vec!["tfr:///terraform-aws-modules/vpc/aws?version=5.8.1"]
        );
    }

    #[test]
    fn test_terragrunt_local_source() {
        let extraction = extract_terragrunt(
            r#"
terraform {
  source = "../../modules/vpc"
}
"#,
        )
        .unwrap();

        assert_eq!(extraction.components.len(), 1);
        let component = &extraction.components[0];
        assert_eq!(component.name, "vpc");
        assert_eq!(component.declared_versions, vec![LOCAL_VERSION]);
    }

    #[test]
    fn test_terragrunt_without_source_yields_nothing() {
        let extraction = extract_terragrunt(
            r#"
remote_state {
  backend = "s3"
  config = {
    bucket = "state-bucket"
  }
}
"#,
        )
        .unwrap();

        assert!(extraction.components.is_empty());
    }

    #[test]
    fn test_terragrunt_blank_source_falls_back_to_stack_name() {
        let extraction = extract_terragrunt(
            r#"
terraform {
  source = ""
}
"#,
        )
        .unwrap();

        assert_eq!(extraction.components.len(), 1);
        assert_eq!(extraction.components[0].name, "app");
    }

    #[test]
    fn test_terragrunt_interpolated_source_yields_nothing() {
        let extraction = extract_terragrunt(
            r#"
terraform {
  source = "${get_parent_terragrunt_dir()}/../modules//vpc"
}
"#,
        )
        .unwrap();

        assert!(extraction.components.is_empty());
    }

    #[test]
    fn test_terragrunt_regex_fallback_recovers_source() {
        // The locals block is cut off mid-expression, so the structured
        // parse fails. The source must still come out of the raw text.
        let extraction = extract_terragrunt(
            r#"
terraform {
  source = "git::https://github.com/acme/terraform-aws-vpc.git?ref=v3.14.0"
}

locals {
  broken =
"#,
        )
        .unwrap();

        assert_eq!(extraction.components.len(), 1);
        let component = &extraction.components[0];
        assert_eq!(component.name, "aws-vpc");
        assert_eq!(component.declared_versions, vec!["v3.14.0"]);
    }

    #[test]
    fn test_terragrunt_unparseable_without_source_is_error() {
        let result = extract_terragrunt("remote_state {\n  backend =\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_tags_every_structure() {
        let blocks = decode_content(
            r#"
module "vpc" {
  source = "./modules/vpc"
}

terraform {
  source = "tfr:///acme/app/aws"
}

locals {
  env = "prod"
}
"#,
            Path::new("terragrunt.hcl"),
        )
        .unwrap();

        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[0], RawBlock::Module { .. }));
        assert!(matches!(blocks[1], RawBlock::TerraformSource { .. }));
        assert!(matches!(blocks[2], RawBlock::Unrecognized));
    }
}
