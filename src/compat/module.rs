//! Structural diff of two module schema versions.

use std::collections::HashMap;

use crate::registry::{ModuleSchema, ModuleInput};
use crate::types::{parse_version, ChangeKind, ChangeSeverity, SchemaChange};

/// Diff two module schemas into severity-classified changes.
///
/// Inputs drive the breaking-change detection: a removed required input, a
/// type change, a dropped default, or a new required input all break
/// existing callers. Outputs and provider requirements mostly inform.
pub(super) fn diff(old: &ModuleSchema, new: &ModuleSchema) -> Vec<SchemaChange> {
    let mut changes = Vec::new();
    diff_inputs(old, new, &mut changes);
    diff_outputs(old, new, &mut changes);
    diff_dependencies(old, new, &mut changes);
    changes
}

fn diff_inputs(old: &ModuleSchema, new: &ModuleSchema, changes: &mut Vec<SchemaChange>) {
    let old_inputs: HashMap<&str, &ModuleInput> =
        old.inputs.iter().map(|i| (i.name.as_str(), i)).collect();
    let new_inputs: HashMap<&str, &ModuleInput> =
        new.inputs.iter().map(|i| (i.name.as_str(), i)).collect();

    for (name, input) in &old_inputs {
        match new_inputs.get(name) {
            None => {
                let (severity, impact) = if input.required {
                    (
                        ChangeSeverity::Error,
                        "Callers setting this input will fail validation",
                    )
                } else {
                    (ChangeSeverity::Info, "Remove the input if you set it")
                };
                changes.push(SchemaChange {
                    kind: ChangeKind::InputRemoved,
                    resource: (*name).to_string(),
                    attribute: None,
                    description: format!("Input '{name}' was removed"),
                    severity,
                    impact: impact.to_string(),
                });
            }
            Some(updated) => {
                if updated.type_name != input.type_name {
                    changes.push(SchemaChange {
                        kind: ChangeKind::InputTypeChanged,
                        resource: (*name).to_string(),
                        attribute: None,
                        description: format!(
                            "Input '{name}' changed type from '{}' to '{}'",
                            input.type_name, updated.type_name
                        ),
                        severity: ChangeSeverity::Error,
                        impact: "Existing values may no longer typecheck".to_string(),
                    });
                }
                if !input.default.is_empty() && updated.default.is_empty() {
                    changes.push(SchemaChange {
                        kind: ChangeKind::InputDefaultRemoved,
                        resource: (*name).to_string(),
                        attribute: None,
                        description: format!("Input '{name}' lost its default value"),
                        severity: ChangeSeverity::Error,
                        impact: "Callers relying on the default must now set it".to_string(),
                    });
                }
            }
        }
    }

    for (name, input) in &new_inputs {
        if old_inputs.contains_key(name) {
            continue;
        }
        let (severity, impact) = if input.required {
            (
                ChangeSeverity::Error,
                "Every caller must now set this input",
            )
        } else {
            (ChangeSeverity::Info, "Optional, no action required")
        };
        changes.push(SchemaChange {
            kind: ChangeKind::InputAdded,
            resource: (*name).to_string(),
            attribute: None,
            description: format!(
                "New {} input '{name}'",
                if input.required { "required" } else { "optional" }
            ),
            severity,
            impact: impact.to_string(),
        });
    }
}

fn diff_outputs(old: &ModuleSchema, new: &ModuleSchema, changes: &mut Vec<SchemaChange>) {
    let old_outputs: HashMap<&str, &str> = old
        .outputs
        .iter()
        .map(|o| (o.name.as_str(), o.description.as_str()))
        .collect();
    let new_outputs: HashMap<&str, &str> = new
        .outputs
        .iter()
        .map(|o| (o.name.as_str(), o.description.as_str()))
        .collect();

    for (name, description) in &old_outputs {
        match new_outputs.get(name) {
            None => changes.push(SchemaChange {
                kind: ChangeKind::OutputRemoved,
                resource: (*name).to_string(),
                attribute: None,
                description: format!("Output '{name}' was removed"),
                severity: ChangeSeverity::Error,
                impact: "References to this output will fail".to_string(),
            }),
            Some(updated) if updated != description => changes.push(SchemaChange {
                kind: ChangeKind::OutputDescriptionChanged,
                resource: (*name).to_string(),
                attribute: None,
                description: format!("Output '{name}' changed its description"),
                severity: ChangeSeverity::Warning,
                impact: "The output's meaning may have shifted".to_string(),
            }),
            Some(_) => {}
        }
    }

    for name in new_outputs.keys() {
        if !old_outputs.contains_key(name) {
            changes.push(SchemaChange {
                kind: ChangeKind::OutputAdded,
                resource: (*name).to_string(),
                attribute: None,
                description: format!("New output '{name}'"),
                severity: ChangeSeverity::Info,
                impact: "Available for use, no action required".to_string(),
            });
        }
    }
}

fn diff_dependencies(old: &ModuleSchema, new: &ModuleSchema, changes: &mut Vec<SchemaChange>) {
    let old_deps: HashMap<&str, &str> = old
        .dependencies
        .iter()
        .map(|d| (d.name.as_str(), d.version.as_str()))
        .collect();

    for dep in &new.dependencies {
        match old_deps.get(dep.name.as_str()) {
            None => changes.push(SchemaChange {
                kind: ChangeKind::DependencyChanged,
                resource: dep.name.clone(),
                attribute: None,
                description: format!("New provider requirement '{}'", dep.name),
                severity: ChangeSeverity::Warning,
                impact: "A provider block may need to be added".to_string(),
            }),
            Some(old_constraint) if *old_constraint != dep.version => {
                let severity = if minimum_increased(old_constraint, &dep.version) {
                    ChangeSeverity::Warning
                } else {
                    ChangeSeverity::Info
                };
                changes.push(SchemaChange {
                    kind: ChangeKind::DependencyChanged,
                    resource: dep.name.clone(),
                    attribute: None,
                    description: format!(
                        "Provider requirement '{}' changed from '{}' to '{}'",
                        dep.name, old_constraint, dep.version
                    ),
                    severity,
                    impact: "Check the installed provider version".to_string(),
                });
            }
            Some(_) => {}
        }
    }
}

/// Whether a constraint change raises the minimum acceptable version.
///
/// Compares the first version number found in each constraint; constraints
/// without one compare as unchanged.
fn minimum_increased(old_constraint: &str, new_constraint: &str) -> bool {
    match (
        crate::probe::constraint_version(old_constraint),
        crate::probe::constraint_version(new_constraint),
    ) {
        (Some(old), Some(new)) => match (parse_version(&old), parse_version(&new)) {
            (Ok(old), Ok(new)) => new > old,
            _ => false,
        },
        _ => false,
    }
}
