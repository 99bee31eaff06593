//! Provider probing through the platform's own tooling.
//!
//! For each stack the probe runs `terraform providers` (or `tofu`, or
//! `terragrunt run ... providers` for Terragrunt-flavored projects) in the
//! stack directory and parses the indented tree it prints. A probe failure
//! of any kind degrades to an empty provider list; it never aborts the
//! inventory run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;

use crate::types::Provider;
use crate::walker::{DiscoveredStack, ProjectContext};
use crate::Result;

/// Default upper bound for one provider-listing invocation.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

/// Matches a `provider[<source>]` leaf with an optional trailing constraint.
static PROVIDER_LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"provider\[([^\]]+)\]\s*(.*)").expect("Invalid regex"));

/// Matches the numeric part of a version constraint (`>= 4.0` yields `4.0`).
static VERSION_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9][0-9A-Za-z.+-]*").expect("Invalid regex"));

/// Which binary drives plain Terraform stacks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Runner {
    /// HashiCorp Terraform
    #[default]
    Terraform,
    /// OpenTofu
    Tofu,
}

impl Runner {
    /// The executable name looked up on PATH.
    #[must_use]
    pub const fn program(&self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Tofu => "tofu",
        }
    }
}

impl fmt::Display for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program())
    }
}

/// Runs the provider-listing command for stacks and parses its output.
#[derive(Debug, Clone)]
pub struct ProviderProbe {
    runner: Runner,
    terragrunt_args: Vec<String>,
    timeout: Duration,
}

impl ProviderProbe {
    /// Create a probe.
    ///
    /// `terragrunt_args` are spliced between `run` and `providers` when the
    /// Terragrunt wrapper drives the stack.
    #[must_use]
    pub fn new(runner: Runner, terragrunt_args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            runner,
            terragrunt_args,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Probe one stack and return its providers.
    ///
    /// Missing executables, timeouts and non-zero exits all degrade to an
    /// empty list with a logged warning.
    pub async fn probe_stack(
        &self,
        context: &ProjectContext,
        stack: &DiscoveredStack,
    ) -> Vec<Provider> {
        let stack_label = stack_label(stack);
        let use_terragrunt =
            context.kind.is_terragrunt_flavored() && stack.terragrunt_file.is_some();
        let (program, args) = self.command_line(use_terragrunt);

        if resolve_program(&program).is_none() {
            tracing::warn!(
                stack = %stack.stack,
                program = %program,
                "Provider listing tool not found on PATH, skipping probe"
            );
            return Vec::new();
        }

        match self.run(&program, &args, &stack.dir, &stack_label).await {
            Ok(output) => {
                let providers = parse_provider_tree(&output, &stack_label);
                tracing::debug!(
                    stack = %stack.stack,
                    providers = providers.len(),
                    "Provider probe finished"
                );
                providers
            }
            Err(e) => {
                tracing::warn!(stack = %stack.stack, error = %e, "Provider probe failed");
                Vec::new()
            }
        }
    }

    /// Pick the program and argument list for a stack.
    fn command_line(&self, use_terragrunt: bool) -> (String, Vec<String>) {
        if use_terragrunt {
            let mut args = vec!["run".to_string()];
            args.extend(self.terragrunt_args.iter().cloned());
            args.push("providers".to_string());
            ("terragrunt".to_string(), args)
        } else {
            (
                self.runner.program().to_string(),
                vec!["providers".to_string()],
            )
        }
    }

    /// Run the command with the stack directory as CWD, bounded by the
    /// configured timeout.
    ///
    /// A non-zero exit still yields whatever stdout was produced.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        dir: &Path,
        stack_label: &str,
    ) -> Result<String> {
        tracing::debug!(
            program = %program,
            args = ?args,
            dir = %dir.display(),
            "Invoking provider listing"
        );

        let mut command = Command::new(program);
        command.args(args).current_dir(dir).kill_on_drop(true);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                crate::err!(ProbeTimeout {
                    stack: stack_label.to_string(),
                    seconds: self.timeout.as_secs(),
                })
            })?
            .map_err(|e| {
                crate::err!(ProbeFailed {
                    stack: stack_label.to_string(),
                    message: e.to_string(),
                })
            })?;

        if !output.status.success() {
            tracing::warn!(
                stack = %stack_label,
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Provider listing exited non-zero, using partial output"
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Display label for a stack: its directory basename.
fn stack_label(stack: &DiscoveredStack) -> String {
    stack
        .dir
        .file_name()
        .map_or_else(|| stack.stack.clone(), |n| n.to_string_lossy().to_string())
}

/// Resolve an executable name against PATH.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    find_in(std::env::split_paths(&path), program)
}

fn find_in(dirs: impl Iterator<Item = PathBuf>, program: &str) -> Option<PathBuf> {
    dirs.map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Parse the indented provider tree printed by `terraform providers`.
///
/// ```text
/// Providers required by configuration:
/// .
/// ├── module.vpc
/// │   ├── provider[registry.terraform.io/hashicorp/aws] >= 4.0
/// │   └── module.subnets
/// │       └── provider[registry.terraform.io/hashicorp/aws]
/// └── provider[registry.terraform.io/hashicorp/random] ~> 3.1
/// ```
///
/// Depth is the connector's character column divided by four. A stack of
/// module names tracks the enclosing chain so that a provider at any depth
/// is attributed to the right dot-joined module path, or `"Root"` when it
/// sits at the top level.
pub(crate) fn parse_provider_tree(output: &str, stack_label: &str) -> Vec<Provider> {
    let mut providers = Vec::new();
    let mut module_stack: Vec<String> = Vec::new();

    for line in output.lines() {
        let Some((depth, content)) = connector_content(line) else {
            continue;
        };

        if let Some(captures) = PROVIDER_LINE_PATTERN.captures(content) {
            module_stack.truncate(depth);
            let source = captures[1].to_string();
            let version = captures.get(2).and_then(|m| constraint_version(m.as_str()));
            let name = source.rsplit('/').next().unwrap_or(&source).to_string();

            providers.push(Provider::new(
                name,
                version,
                source,
                module_chain(&module_stack),
                stack_label,
            ));
        } else if let Some(name) = content.strip_prefix("module.") {
            module_stack.truncate(depth);
            module_stack.push(name.trim().to_string());
        } else {
            tracing::trace!(line = %line, "Ignoring unrecognized provider tree line");
        }
    }

    providers
}

/// Numeric part of a version constraint, operators stripped.
///
/// `">= 4.0"` yields `"4.0"`; a bare operator or empty text yields `None`.
pub(crate) fn constraint_version(text: &str) -> Option<String> {
    VERSION_NUMBER_PATTERN
        .find(text)
        .map(|m| m.as_str().to_string())
}

/// Split a tree line into its nesting depth and the text after the connector.
///
/// Columns are counted in characters; the connector glyphs are multi-byte.
fn connector_content(line: &str) -> Option<(usize, &str)> {
    let start = line.find("├──").or_else(|| line.find("└──"))?;
    let depth = line[..start].chars().count() / 4;
    let content = line[start..]
        .trim_start_matches(['├', '└', '─'])
        .trim();
    Some((depth, content))
}

/// Dot-joined module chain, `None` for top-level providers.
fn module_chain(module_stack: &[String]) -> Option<String> {
    if module_stack.is_empty() {
        None
    } else {
        let chain: Vec<String> = module_stack
            .iter()
            .map(|name| format!("module.{name}"))
            .collect();
        Some(chain.join("."))
    }
}
