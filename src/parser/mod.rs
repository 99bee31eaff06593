//! Configuration file parsing for Terraform/OpenTofu and Terragrunt.
//!
//! This module turns individual configuration files into [`Component`]
//! records: `module` blocks from `.tf` files and `terraform { source }`
//! declarations from `terragrunt.hcl` files, plus declared
//! `required_providers` entries used as a probe fallback.
//!
//! # Example
//!
//! ```rust
//! use vigie::parser::{Extractor, TerraformExtractor};
//! use std::path::Path;
//!
//! let content = r#"
//! module "vpc" {
//!   source  = "terraform-aws-modules/vpc/aws"
//!   version = "5.8.1"
//! }
//! "#;
//!
//! let extractor = TerraformExtractor::new();
//! let extraction = extractor
//!     .extract(content, Path::new("main.tf"), "root")
//!     .unwrap();
//! assert_eq!(extraction.components.len(), 1);
//! ```

pub mod hcl;
pub mod source;

pub use hcl::{Extraction, RawBlock, TerraformExtractor, TerragruntExtractor};
pub use source::{locate, DEFAULT_REGISTRY};

/// File extensions recognized as Terraform/OpenTofu files.
pub const TERRAFORM_EXTENSIONS: &[&str] = &[".tf", ".tf.json"];

/// File name recognized as a Terragrunt stack definition.
pub const TERRAGRUNT_FILE: &str = "terragrunt.hcl";

/// Trait for extracting components from configuration file content.
///
/// Extraction is pure on `(content, file)`; `stack_name` is only used as a
/// naming fallback when no name can be derived from the source string.
pub trait Extractor: Send + Sync {
    /// Extract all components declared in one file's content.
    ///
    /// `file` is recorded on the resulting components as-is and should be
    /// relative to the scan root.
    ///
    /// # Errors
    ///
    /// Returns an error when the content cannot be parsed at all; callers
    /// are expected to log it and continue with zero components.
    fn extract(&self, content: &str, file: &std::path::Path, stack_name: &str) -> crate::Result<Extraction>;
}
