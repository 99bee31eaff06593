//! Report rendering and output.
//!
//! The reporter wraps an assembled [`Inventory`] (and optional compatibility
//! reports) in a [`ReportEnvelope`] and serializes it as JSON or YAML to
//! stdout or a file. The envelope's metadata carries the only timestamp, so
//! the inventory inside stays byte-stable between runs over unchanged input.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::OutputConfig;
use crate::types::{CompatibilityReport, Inventory};
use crate::Result;

/// Report serialization format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// JSON via `serde_json`
    #[default]
    Json,
    /// YAML via `serde_yaml`
    Yaml,
}

/// Provenance metadata stamped on every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// RFC 3339 generation timestamp
    pub generated_at: String,
    /// Producing tool name
    pub tool: String,
    /// Producing tool version
    pub version: String,
}

impl ReportMetadata {
    fn now() -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            tool: "vigie".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The top-level report document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEnvelope {
    /// Generation metadata
    pub metadata: ReportMetadata,
    /// The assembled inventory
    pub inventory: Inventory,
    /// Compatibility analyses, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<Vec<CompatibilityReport>>,
}

impl ReportEnvelope {
    /// Wrap an inventory, stamping the generation metadata.
    #[must_use]
    pub fn new(inventory: Inventory, compatibility: Option<Vec<CompatibilityReport>>) -> Self {
        Self {
            metadata: ReportMetadata::now(),
            inventory,
            compatibility,
        }
    }
}

/// Serializes report envelopes to stdout or a file.
pub struct Reporter {
    format: ReportFormat,
    pretty: bool,
}

impl Reporter {
    /// Create a reporter from the output configuration.
    #[must_use]
    pub fn new(output: &OutputConfig) -> Self {
        Self {
            format: output.format,
            pretty: output.pretty,
        }
    }

    /// Render an envelope in the configured format.
    ///
    /// # Errors
    ///
    /// Returns a `ReportGeneration` error when serialization fails.
    pub fn render(&self, envelope: &ReportEnvelope) -> Result<String> {
        match self.format {
            ReportFormat::Json => {
                let json = if self.pretty {
                    serde_json::to_string_pretty(envelope)
                } else {
                    serde_json::to_string(envelope)
                };
                json.map_err(|e| {
                    crate::err!(ReportGeneration {
                        message: format!("Failed to serialize JSON report: {e}"),
                    })
                })
            }
            ReportFormat::Yaml => serde_yaml::to_string(envelope).map_err(|e| {
                crate::err!(ReportGeneration {
                    message: format!("Failed to serialize YAML report: {e}"),
                })
            }),
        }
    }

    /// Render an envelope and write it to `output`, or stdout when `None`.
    ///
    /// # Errors
    ///
    /// Returns a `ReportGeneration` error on serialization failure or an
    /// `Io` error when the output file cannot be written.
    pub fn write(&self, envelope: &ReportEnvelope, output: Option<&Path>) -> Result<()> {
        let rendered = self.render(envelope)?;
        match output {
            Some(path) => {
                std::fs::write(path, rendered.as_bytes()).map_err(|e| {
                    crate::err!(Io {
                        path: path.to_path_buf(),
                        source: e,
                    })
                })?;
                tracing::info!(path = %path.display(), "Report written");
            }
            None => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                writeln!(handle, "{rendered}").map_err(|e| {
                    crate::err!(Io {
                        path: std::path::PathBuf::from("<stdout>"),
                        source: e,
                    })
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProjectKind;
    use tempfile::TempDir;

    fn envelope() -> ReportEnvelope {
        ReportEnvelope::new(Inventory::new("demo", ProjectKind::Terraform), None)
    }

    fn reporter(format: ReportFormat) -> Reporter {
        Reporter {
            format,
            pretty: true,
        }
    }

    #[test]
    fn test_json_render_shape() {
        let rendered = reporter(ReportFormat::Json).render(&envelope()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(value["metadata"]["tool"], "vigie");
        assert_eq!(value["metadata"]["version"], env!("CARGO_PKG_VERSION"));
        assert!(value["metadata"]["generatedAt"].is_string());
        assert_eq!(value["inventory"]["projectName"], "demo");
        // Absent compatibility must not serialize as null.
        assert!(value.get("compatibility").is_none());
    }

    #[test]
    fn test_yaml_render_roundtrips() {
        let rendered = reporter(ReportFormat::Yaml).render(&envelope()).unwrap();
        let parsed: ReportEnvelope = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(parsed.inventory.project_name, "demo");
    }

    #[test]
    fn test_write_to_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("report.json");

        reporter(ReportFormat::Json)
            .write(&envelope(), Some(&path))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"projectName\": \"demo\""));
    }

    #[test]
    fn test_inventory_body_is_stable_across_envelopes() {
        let inventory = Inventory::new("demo", ProjectKind::Terraform);
        let first = ReportEnvelope::new(inventory.clone(), None);
        let second = ReportEnvelope::new(inventory, None);
        assert_eq!(
            serde_json::to_string(&first.inventory).unwrap(),
            serde_json::to_string(&second.inventory).unwrap()
        );
    }
}
