//! Command-line interface definition.
//!
//! # Commands
//!
//! - `scan`: Walk a directory, extract the inventory, resolve versions
//! - `compat`: Analyze upgrade compatibility for one module or provider
//! - `init`: Create an example configuration file
//! - `validate`: Validate a configuration file
//!
//! # Example Usage
//!
//! ```bash
//! # Scan the current directory and print the JSON report
//! vigie scan
//!
//! # Scan without touching the network or the terraform binary
//! vigie scan ./infra --no-resolve --no-probe
//!
//! # Scan with compatibility analysis, YAML output to a file
//! vigie scan ./infra --compat --format yaml --output report.yaml
//!
//! # Check one module upgrade
//! vigie compat module terraform-aws-modules/vpc/aws --current 5.0.0
//!
//! # Check a provider upgrade against a specific target
//! vigie compat provider hashicorp/aws --current 4.67.0 --target 5.31.0
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::probe::Runner;
use crate::reporter::ReportFormat;

/// Vigie - Terraform/OpenTofu/Terragrunt inventory and compatibility engine.
#[derive(Parser, Debug)]
#[command(
    name = "vigie",
    author,
    version,
    about = "Terraform/OpenTofu/Terragrunt inventory and upgrade-compatibility engine",
    long_about = "Vigie walks an infrastructure-as-code repository, extracts every module \
                  and provider declaration, resolves their latest released versions against \
                  the registries, and classifies upgrade compatibility."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "VIGIE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a directory and build the inventory report
    #[command(visible_alias = "s")]
    Scan(ScanArgs),

    /// Analyze upgrade compatibility for one module or provider
    #[command(visible_alias = "c")]
    Compat(CompatArgs),

    /// Create an example configuration file
    Init,

    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Arguments for the scan command.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory to scan
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Resolve latest versions against the registries (default)
    #[arg(long, overrides_with = "no_resolve")]
    pub resolve: bool,

    /// Skip registry version resolution
    #[arg(long)]
    pub no_resolve: bool,

    /// Analyze upgrade compatibility for outdated components
    #[arg(long)]
    pub compat: bool,

    /// Include cache directories (.terraform, .terragrunt-cache) in the walk
    #[arg(long)]
    pub complete: bool,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Probe providers through the platform tooling (default)
    #[arg(long, overrides_with = "no_probe")]
    pub probe: bool,

    /// Skip the provider probe
    #[arg(long)]
    pub no_probe: bool,

    /// Binary driving plain Terraform stacks
    #[arg(long, value_enum)]
    pub runner: Option<Runner>,

    /// Project name override (defaults to the scan root's basename)
    #[arg(long, value_name = "NAME")]
    pub project_name: Option<String>,

    /// Patterns to exclude from scanning (glob patterns)
    #[arg(short, long = "exclude", value_name = "PATTERN")]
    pub exclude_patterns: Vec<String>,
}

impl ScanArgs {
    /// Whether registry resolution should run.
    #[must_use]
    pub fn resolve_enabled(&self) -> bool {
        !self.no_resolve
    }
}

/// Arguments for the compat command.
#[derive(Args, Debug)]
pub struct CompatArgs {
    /// What kind of subject to analyze
    #[command(subcommand)]
    pub subject: CompatSubject,
}

/// The subject of a compatibility analysis.
#[derive(Subcommand, Debug)]
pub enum CompatSubject {
    /// A registry module (`ns/name/provider`)
    Module(CompatSubjectArgs),
    /// A provider (`ns/name`)
    Provider(CompatSubjectArgs),
}

/// Source and version pair for one compatibility analysis.
#[derive(Args, Debug)]
pub struct CompatSubjectArgs {
    /// Module or provider source
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Currently declared version
    #[arg(long, value_name = "VERSION")]
    pub current: String,

    /// Target version (defaults to the latest released version)
    #[arg(long, value_name = "VERSION")]
    pub target: Option<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,
}

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(value_name = "FILE", default_value = "vigie.yaml")]
    pub config: PathBuf,
}
