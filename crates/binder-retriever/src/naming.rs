//! Aggregate key naming
//!
//! Keys look like environment variables:
//! `[<PREFIX>_]<CRKIND>_[SECRET_|CONFIGMAP_]<KEY>`, with `:` and `.` replaced
//! by `_` and everything upper-cased.

/// Where a raw key came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySource {
    /// A literal value from the custom resource; the raw key is the descriptor path
    Attribute,
    /// A key of a referenced secret
    Secret,
    /// A key of a referenced config map
    ConfigMap,
}

impl KeySource {
    fn sub_prefix(&self) -> Option<&'static str> {
        match self {
            KeySource::Attribute => None,
            KeySource::Secret => Some("secret_"),
            KeySource::ConfigMap => Some("configMap_"),
        }
    }
}

/// Builds aggregate keys for one custom resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyNamer {
    binding_prefix: Option<String>,
    cr_kind: String,
}

impl KeyNamer {
    /// Create a namer; an empty prefix is the same as no prefix
    pub fn new(binding_prefix: Option<&str>, cr_kind: impl Into<String>) -> Self {
        Self {
            binding_prefix: binding_prefix
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            cr_kind: cr_kind.into(),
        }
    }

    /// Build the aggregate key for `raw_key`
    pub fn name(&self, source: KeySource, raw_key: &str) -> String {
        let key = match source.sub_prefix() {
            Some(sub) => format!("{sub}{raw_key}"),
            None => raw_key.to_string(),
        };
        let key = key.replace([':', '.'], "_");
        let key = match &self.binding_prefix {
            Some(prefix) => format!("{}_{}_{}", prefix, self.cr_kind, key),
            None => format!("{}_{}", self.cr_kind, key),
        };
        key.to_uppercase()
    }
}
