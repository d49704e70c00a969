//! Binding plan model
//!
//! A plan pairs a custom resource snapshot with the descriptor schema of its
//! CRD and names the aggregate secret to publish. Plans are produced by an
//! external provider and are already validated when they reach the retriever.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use binder_common::{Error, Result};

/// One section of a custom resource that descriptors point into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    /// The `spec` section
    Spec,
    /// The `status` section
    Status,
}

impl Section {
    /// Top level key holding this section in the resource
    pub fn key(&self) -> &'static str {
        match self {
            Section::Spec => "spec",
            Section::Status => "status",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// A descriptor attached to one field of the CRD
///
/// Example:
/// ```yaml
/// path: credentials.secretName
/// x-descriptors:
///   - binding:env:object:secret:password
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Dotted path into the section
    pub path: String,

    /// Marker strings describing how the value at `path` is interpreted
    #[serde(default, rename = "x-descriptors", alias = "xDescriptors")]
    pub x_descriptors: Vec<String>,
}

impl FieldDescriptor {
    /// Create a descriptor for `path` with the given markers
    pub fn new<I, S>(path: impl Into<String>, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            x_descriptors: markers.into_iter().map(Into::into).collect(),
        }
    }
}

/// Descriptors for the spec and status sections, in declared order
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorSchema {
    /// Descriptors evaluated against `spec`
    #[serde(default)]
    pub spec_descriptors: Vec<FieldDescriptor>,

    /// Descriptors evaluated against `status`
    #[serde(default)]
    pub status_descriptors: Vec<FieldDescriptor>,
}

impl DescriptorSchema {
    /// Descriptors declared for a section
    pub fn for_section(&self, section: Section) -> &[FieldDescriptor] {
        match section {
            Section::Spec => &self.spec_descriptors,
            Section::Status => &self.status_descriptors,
        }
    }
}

/// One binding task
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Namespace holding referenced resources and the aggregate secret
    pub namespace: String,

    /// Name of the aggregate secret
    pub name: String,

    /// Snapshot of the custom resource instance
    pub custom_resource: DynamicObject,

    /// Descriptor schema of the custom resource's CRD
    #[serde(default)]
    pub descriptors: DescriptorSchema,
}

impl Plan {
    /// Kind of the custom resource, used in every aggregate key
    pub fn cr_kind(&self) -> Result<&str> {
        self.custom_resource
            .types
            .as_ref()
            .map(|t| t.kind.as_str())
            .filter(|kind| !kind.is_empty())
            .ok_or_else(|| {
                Error::malformed(
                    "custom resource",
                    self.custom_resource.name_any(),
                    "missing kind",
                )
            })
    }

    /// Name of the custom resource
    pub fn cr_name(&self) -> String {
        self.custom_resource.name_any()
    }

    /// Parse a plan from YAML (or JSON, which is valid YAML)
    pub fn from_yaml(input: &str) -> Result<Self> {
        serde_yaml::from_str(input).map_err(|e| Error::plan(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN_YAML: &str = r#"
namespace: apps
name: db-binding
customResource:
  apiVersion: example.dev/v1
  kind: Database
  metadata:
    name: orders-db
    namespace: apps
  spec:
    host: db.local
    secretName: db-creds
descriptors:
  specDescriptors:
    - path: host
      x-descriptors:
        - binding:env:attribute
    - path: secretName
      xDescriptors:
        - binding:env:object:secret:password
"#;

    #[test]
    fn plan_loads_from_yaml() {
        let plan = Plan::from_yaml(PLAN_YAML).unwrap();
        assert_eq!(plan.namespace, "apps");
        assert_eq!(plan.name, "db-binding");
        assert_eq!(plan.cr_kind().unwrap(), "Database");
        assert_eq!(plan.cr_name(), "orders-db");

        let spec = plan.descriptors.for_section(Section::Spec);
        assert_eq!(spec.len(), 2);
        assert_eq!(
            spec[0],
            FieldDescriptor::new("host", ["binding:env:attribute"])
        );
        assert_eq!(
            spec[1].x_descriptors,
            vec!["binding:env:object:secret:password"]
        );
        assert!(plan.descriptors.for_section(Section::Status).is_empty());
    }

    #[test]
    fn plan_without_kind_is_malformed() {
        let mut plan = Plan::from_yaml(PLAN_YAML).unwrap();
        plan.custom_resource.types = None;
        let err = plan.cr_kind().unwrap_err();
        assert!(matches!(err, Error::MalformedResource { .. }));
        assert!(err.to_string().contains("orders-db"));
    }

    #[test]
    fn invalid_yaml_is_a_plan_error() {
        let err = Plan::from_yaml("namespace: [").unwrap_err();
        assert!(matches!(err, Error::Plan { .. }));
    }

    #[test]
    fn section_keys() {
        assert_eq!(Section::Spec.key(), "spec");
        assert_eq!(Section::Status.to_string(), "status");
    }
}
