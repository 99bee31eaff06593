//! Structural diff of two provider schema versions.

use std::collections::HashMap;

use crate::registry::{AttributeSchema, ProviderSchema, ResourceSchema};
use crate::types::{ChangeKind, ChangeSeverity, SchemaChange};

/// Diff two provider schemas into severity-classified changes.
///
/// Removed resources and required-attribute changes break existing
/// configurations; additions only inform.
pub(super) fn diff(old: &ProviderSchema, new: &ProviderSchema) -> Vec<SchemaChange> {
    let mut changes = Vec::new();

    let old_resources: HashMap<&str, &ResourceSchema> =
        old.resources.iter().map(|r| (r.name.as_str(), r)).collect();
    let new_resources: HashMap<&str, &ResourceSchema> =
        new.resources.iter().map(|r| (r.name.as_str(), r)).collect();

    for (name, resource) in &old_resources {
        match new_resources.get(name) {
            None => changes.push(SchemaChange {
                kind: ChangeKind::ResourceRemoved,
                resource: (*name).to_string(),
                attribute: None,
                description: format!("Resource '{name}' was removed"),
                severity: ChangeSeverity::Error,
                impact: "Configurations using this resource will fail".to_string(),
            }),
            Some(updated) => diff_attributes(name, resource, updated, &mut changes),
        }
    }

    for name in new_resources.keys() {
        if !old_resources.contains_key(name) {
            changes.push(SchemaChange {
                kind: ChangeKind::ResourceAdded,
                resource: (*name).to_string(),
                attribute: None,
                description: format!("New resource '{name}'"),
                severity: ChangeSeverity::Info,
                impact: "Available for use, no action required".to_string(),
            });
        }
    }

    changes
}

fn diff_attributes(
    resource: &str,
    old: &ResourceSchema,
    new: &ResourceSchema,
    changes: &mut Vec<SchemaChange>,
) {
    let old_attrs: HashMap<&str, &AttributeSchema> =
        old.attributes.iter().map(|a| (a.name.as_str(), a)).collect();
    let new_attrs: HashMap<&str, &AttributeSchema> =
        new.attributes.iter().map(|a| (a.name.as_str(), a)).collect();

    for (name, attr) in &old_attrs {
        match new_attrs.get(name) {
            None => {
                let (severity, impact) = if attr.required {
                    (
                        ChangeSeverity::Error,
                        "Configurations setting this attribute will fail",
                    )
                } else {
                    (ChangeSeverity::Warning, "Remove the attribute if you set it")
                };
                changes.push(SchemaChange {
                    kind: ChangeKind::AttributeRemoved,
                    resource: resource.to_string(),
                    attribute: Some((*name).to_string()),
                    description: format!("Attribute '{name}' was removed from '{resource}'"),
                    severity,
                    impact: impact.to_string(),
                });
            }
            Some(updated) if updated.required != attr.required => {
                let (kind_desc, severity, impact) = if updated.required {
                    (
                        "optional to required",
                        ChangeSeverity::Error,
                        "Every configuration must now set this attribute",
                    )
                } else {
                    (
                        "required to optional",
                        ChangeSeverity::Info,
                        "The attribute may now be omitted",
                    )
                };
                changes.push(SchemaChange {
                    kind: ChangeKind::AttributeRequirednessChanged,
                    resource: resource.to_string(),
                    attribute: Some((*name).to_string()),
                    description: format!(
                        "Attribute '{name}' of '{resource}' changed from {kind_desc}"
                    ),
                    severity,
                    impact: impact.to_string(),
                });
            }
            Some(_) => {}
        }
    }

    for name in new_attrs.keys() {
        if !old_attrs.contains_key(name) {
            changes.push(SchemaChange {
                kind: ChangeKind::AttributeAdded,
                resource: resource.to_string(),
                attribute: Some((*name).to_string()),
                description: format!("New attribute '{name}' on '{resource}'"),
                severity: ChangeSeverity::Info,
                impact: "Available for use, no action required".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(name: &str, attrs: Vec<(&str, bool)>) -> ResourceSchema {
        ResourceSchema {
            name: name.to_string(),
            attributes: attrs
                .into_iter()
                .map(|(n, required)| AttributeSchema {
                    name: n.to_string(),
                    required,
                })
                .collect(),
        }
    }

    fn schema(resources: Vec<ResourceSchema>) -> ProviderSchema {
        ProviderSchema { resources }
    }

    #[test]
    fn test_resource_removed_is_breaking() {
        let old = schema(vec![resource("aws_instance", vec![])]);
        let new = schema(vec![]);

        let changes = diff(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::ResourceRemoved);
        assert_eq!(changes[0].severity, ChangeSeverity::Error);
    }

    #[test]
    fn test_resource_added_is_info() {
        let new = schema(vec![resource("aws_vpc_lattice_service", vec![])]);
        let changes = diff(&schema(vec![]), &new);
        assert_eq!(changes[0].kind, ChangeKind::ResourceAdded);
        assert_eq!(changes[0].severity, ChangeSeverity::Info);
    }

    #[test]
    fn test_required_attribute_removed_is_error() {
        let old = schema(vec![resource("aws_instance", vec![("ami", true)])]);
        let new = schema(vec![resource("aws_instance", vec![])]);

        let changes = diff(&old, &new);
        assert_eq!(changes[0].kind, ChangeKind::AttributeRemoved);
        assert_eq!(changes[0].severity, ChangeSeverity::Error);
        assert_eq!(changes[0].attribute.as_deref(), Some("ami"));
    }

    #[test]
    fn test_optional_attribute_removed_is_warning() {
        let old = schema(vec![resource("aws_instance", vec![("tags", false)])]);
        let new = schema(vec![resource("aws_instance", vec![])]);

        let changes = diff(&old, &new);
        assert_eq!(changes[0].severity, ChangeSeverity::Warning);
    }

    #[test]
    fn test_requiredness_flip() {
        let old = schema(vec![resource(
            "aws_s3_bucket",
            vec![("bucket", false), ("acl", true)],
        )]);
        let new = schema(vec![resource(
            "aws_s3_bucket",
            vec![("bucket", true), ("acl", false)],
        )]);

        let changes = diff(&old, &new);
        let to_required = changes
            .iter()
            .find(|c| c.attribute.as_deref() == Some("bucket"))
            .unwrap();
        let to_optional = changes
            .iter()
            .find(|c| c.attribute.as_deref() == Some("acl"))
            .unwrap();
        assert_eq!(to_required.severity, ChangeSeverity::Error);
        assert_eq!(to_optional.severity, ChangeSeverity::Info);
    }

    #[test]
    fn test_identical_schemas_no_changes() {
        let s = schema(vec![resource("aws_instance", vec![("ami", true)])]);
        assert!(diff(&s, &s.clone()).is_empty());
    }
}
