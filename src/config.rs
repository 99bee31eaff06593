//! Configuration module for Vigie.
//!
//! This module handles loading and validating configuration from:
//! - YAML configuration files (`vigie.yaml`)
//! - Environment variables
//! - CLI arguments
//!
//! # Configuration File Format
//!
//! ```yaml
//! # vigie.yaml
//!
//! # Scanning options
//! scan:
//!   exclude_patterns:
//!     - "**/sandbox/**"
//!   complete: false
//!   max_depth: 100
//!
//! # Provider probe options
//! probe:
//!   enabled: true
//!   runner: terraform
//!   timeout_secs: 30
//!
//! # Registry options
//! registry:
//!   github_token: ${GITHUB_TOKEN}  # Environment variable expansion
//!   concurrency: 8
//!
//! # Output options
//! output:
//!   format: json
//!   pretty: true
//! ```

use crate::error::Result;
use crate::probe::{Runner, DEFAULT_PROBE_TIMEOUT_SECS};
use crate::registry::RateLimitConfig;
use crate::reporter::ReportFormat;
use serde::{Deserialize, Serialize};

/// Scanning options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Patterns to exclude from scanning (glob patterns against
    /// root-relative paths).
    pub exclude_patterns: Vec<String>,

    /// Include `.terraform`/`.terragrunt-cache`/`.git` directories in the
    /// walk (audit-grade completeness scans).
    pub complete: bool,

    /// Maximum depth for recursive directory scanning.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Follow symbolic links during the walk.
    #[serde(default = "default_true")]
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            complete: false,
            max_depth: default_max_depth(),
            follow_symlinks: true,
        }
    }
}

/// Provider probe options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Run the provider-listing tool per stack.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Binary driving plain Terraform stacks (`terraform` or `tofu`).
    pub runner: Runner,

    /// Extra arguments spliced into `terragrunt run <args> providers`.
    pub terragrunt_args: Vec<String>,

    /// Upper bound for one provider-listing invocation, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,

    /// Synthesize providers from declared `required_providers` entries when
    /// the probe is disabled or comes back empty.
    #[serde(default = "default_true")]
    pub declared_fallback: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            runner: Runner::default(),
            terragrunt_args: Vec::new(),
            timeout_secs: default_probe_timeout(),
            declared_fallback: true,
        }
    }
}

/// Registry lookup options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Module registry base URL.
    #[serde(default = "default_registry_url")]
    pub module_base_url: String,

    /// Provider registry base URL.
    #[serde(default = "default_registry_url")]
    pub provider_base_url: String,

    /// GitHub API base URL.
    #[serde(default = "default_github_url")]
    pub github_base_url: String,

    /// GitHub token for release lookups on private/rate-limited repos.
    pub github_token: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Concurrent in-flight lookups during batch resolution.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upper bound for one whole resolution batch, in seconds. Unset means
    /// only the per-request timeout applies.
    pub batch_timeout_secs: Option<u64>,

    /// Retries per request on transient failures (5xx, 429).
    #[serde(default = "default_retries")]
    pub max_retries: usize,

    /// Initial retry delay in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            module_base_url: default_registry_url(),
            provider_base_url: default_registry_url(),
            github_base_url: default_github_url(),
            github_token: None,
            timeout_secs: default_request_timeout(),
            concurrency: default_concurrency(),
            batch_timeout_secs: None,
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl RegistryConfig {
    /// Rate limiting parameters for the HTTP client and the resolver.
    #[must_use]
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_concurrent: self.concurrency,
            delay_ms: self.retry_delay_ms,
            max_retries: self.max_retries,
            ..RateLimitConfig::default()
        }
    }

    /// Fill the GitHub token from the environment when the file left it out.
    ///
    /// `VIGIE_GITHUB_TOKEN` wins over the conventional `GITHUB_TOKEN`.
    pub fn load_token_from_env(&mut self) {
        if self.github_token.is_some() {
            return;
        }
        for var in ["VIGIE_GITHUB_TOKEN", "GITHUB_TOKEN"] {
            if let Ok(token) = std::env::var(var) {
                if !token.is_empty() {
                    tracing::debug!(env_var = %var, "Loaded GitHub token from environment");
                    self.github_token = Some(token);
                    return;
                }
            }
        }
    }
}

/// Output options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Report format when the CLI does not specify one.
    pub format: ReportFormat,

    /// Pretty-print JSON output.
    #[serde(default = "default_true")]
    pub pretty: bool,
}

/// Main configuration structure with nested sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scanning options
    pub scan: ScanConfig,

    /// Provider probe options
    pub probe: ProbeConfig,

    /// Registry lookup options
    pub registry: RegistryConfig,

    /// Output options
    pub output: OutputConfig,
}

fn default_max_depth() -> usize {
    100
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_registry_url() -> String {
    "https://registry.terraform.io".to_string()
}

fn default_github_url() -> String {
    "https://api.github.com".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_concurrency() -> usize {
    8
}

fn default_retries() -> usize {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML string.
    ///
    /// Environment variables (`${VAR}` and `$VAR`) are expanded before
    /// deserialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);

        let config: Config = serde_yaml::from_str(&expanded).map_err(|e| {
            crate::err!(ConfigParse {
                message: e.to_string(),
                source: None,
            })
        })?;

        tracing::debug!(
            exclude_patterns = config.scan.exclude_patterns.len(),
            probe_enabled = config.probe.enabled,
            concurrency = config.registry.concurrency,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Check the configuration for values no run could work with.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigValue` error naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.registry.concurrency == 0 {
            return Err(crate::err!(ConfigValue {
                key: "registry.concurrency".to_string(),
                message: "must be greater than 0".to_string(),
            }));
        }
        if self.registry.timeout_secs == 0 {
            return Err(crate::err!(ConfigValue {
                key: "registry.timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            }));
        }
        if self.registry.batch_timeout_secs == Some(0) {
            return Err(crate::err!(ConfigValue {
                key: "registry.batch_timeout_secs".to_string(),
                message: "must be greater than 0 when set".to_string(),
            }));
        }
        if self.probe.timeout_secs == 0 {
            return Err(crate::err!(ConfigValue {
                key: "probe.timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            }));
        }
        if self.scan.max_depth == 0 {
            return Err(crate::err!(ConfigValue {
                key: "scan.max_depth".to_string(),
                message: "must be greater than 0".to_string(),
            }));
        }
        Ok(())
    }

    /// Generate an example YAML configuration.
    #[must_use]
    pub fn example_yaml() -> String {
        r#"# Vigie Configuration File

# Scanning options
scan:
  # Patterns to exclude from scanning (glob patterns, relative to the root)
  exclude_patterns: []
  #   - "**/sandbox/**"

  # Include .terraform / .terragrunt-cache / .git directories in the walk
  complete: false

  # Maximum depth for recursive directory scanning
  max_depth: 100

  # Follow symbolic links
  follow_symlinks: true

# Provider probe options
probe:
  # Run `terraform providers` (or tofu/terragrunt) per stack
  enabled: true

  # Binary driving plain Terraform stacks: terraform or tofu
  runner: terraform

  # Extra arguments for `terragrunt run <args> providers`
  terragrunt_args: []

  # Upper bound for one invocation, in seconds
  timeout_secs: 30

  # Fall back to declared required_providers when the probe yields nothing
  declared_fallback: true

# Registry options
registry:
  # Registry endpoints (override for private registries or tests)
  module_base_url: "https://registry.terraform.io"
  provider_base_url: "https://registry.terraform.io"
  github_base_url: "https://api.github.com"

  # GitHub token (can use environment variable expansion)
  # github_token: ${GITHUB_TOKEN}

  # Per-request timeout in seconds
  timeout_secs: 30

  # Concurrent in-flight lookups during batch resolution
  concurrency: 8

  # Optional upper bound for one whole resolution batch, in seconds
  # batch_timeout_secs: 120

  # Retries on transient failures, and the initial retry delay
  max_retries: 3
  retry_delay_ms: 1000

# Output options
output:
  # Default report format: json or yaml
  format: json

  # Pretty-print JSON output
  pretty: true
"#
        .to_string()
    }

    /// Merge CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &crate::cli::ScanArgs) {
        if !args.exclude_patterns.is_empty() {
            self.scan
                .exclude_patterns
                .extend(args.exclude_patterns.iter().cloned());
        }
        if args.complete {
            self.scan.complete = true;
        }
        if args.no_probe {
            self.probe.enabled = false;
        }
        if let Some(runner) = args.runner {
            self.probe.runner = runner;
        }
        if let Some(format) = args.format {
            self.output.format = format;
        }
    }

    /// Load tokens from environment variables.
    ///
    /// Called after loading so a token never has to live in the file.
    pub fn load_tokens_from_env(&mut self) {
        self.registry.load_token_from_env();
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax; unset variables are left untouched.
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("Invalid regex");
    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    let re = regex::Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex");
    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.probe.enabled);
        assert!(config.probe.declared_fallback);
        assert_eq!(config.probe.runner, Runner::Terraform);
        assert_eq!(config.scan.max_depth, 100);
        assert_eq!(config.registry.concurrency, 8);
        assert_eq!(config.registry.module_base_url, "https://registry.terraform.io");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml_nested() {
        let yaml = r#"
scan:
  exclude_patterns:
    - "**/sandbox/**"
  complete: true
  max_depth: 50
probe:
  enabled: false
  runner: tofu
registry:
  concurrency: 4
  module_base_url: "https://registry.example.io"
output:
  format: yaml
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert!(config
            .scan
            .exclude_patterns
            .contains(&"**/sandbox/**".to_string()));
        assert!(config.scan.complete);
        assert_eq!(config.scan.max_depth, 50);
        assert!(!config.probe.enabled);
        assert_eq!(config.probe.runner, Runner::Tofu);
        assert_eq!(config.registry.concurrency, 4);
        assert_eq!(config.registry.module_base_url, "https://registry.example.io");
        assert_eq!(config.output.format, ReportFormat::Yaml);
    }

    #[test]
    fn test_config_partial_yaml_keeps_defaults() {
        let yaml = r#"
probe:
  runner: tofu
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.probe.runner, Runner::Tofu);
        assert!(config.probe.enabled);
        assert_eq!(config.registry.concurrency, 8);
    }

    #[test]
    fn test_config_invalid_yaml_is_error() {
        assert!(Config::from_yaml("scan: [not a map").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.registry.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = Config::default();
        config.probe.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.registry.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.registry.batch_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_var_expansion() {
        // Unset variables stay literal, so a missing token does not silently
        // become an empty string.
        let expanded = expand_env_vars("token: ${VIGIE_TEST_UNSET_VAR}");
        assert!(expanded.contains("${VIGIE_TEST_UNSET_VAR}"));

        for pattern in ["no vars here", "$NOTAVAR123", "normal = ${KEY}"] {
            let _ = expand_env_vars(pattern);
        }
    }

    #[test]
    fn test_example_yaml_is_valid() {
        let example = Config::example_yaml();
        let config = Config::from_yaml(&example).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_mapping() {
        let mut config = RegistryConfig::default();
        config.concurrency = 3;
        config.max_retries = 1;
        config.retry_delay_ms = 50;

        let limits = config.rate_limit();
        assert_eq!(limits.max_concurrent, 3);
        assert_eq!(limits.max_retries, 1);
        assert_eq!(limits.delay_ms, 50);
    }
}
