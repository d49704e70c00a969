//! Descriptor marker classification
//!
//! Markers are free-form strings attached to CRD fields. Only four prefixes
//! carry meaning for binding; everything else is ignored explicitly.

use std::collections::BTreeSet;

use indexmap::IndexMap;

/// Marker for a field naming a secret, suffix is the item to bind
pub const SECRET_PREFIX: &str = "binding:env:object:secret";
/// Marker for a field naming a config map, suffix is the item to bind
pub const CONFIG_MAP_PREFIX: &str = "binding:env:object:configmap";
/// Marker for a field naming a secret that is also mounted as a volume
pub const VOLUME_MOUNT_SECRET_PREFIX: &str = "binding:volumemount:secret";
/// Marker for a field whose value is itself the binding data
pub const ATTRIBUTE_PREFIX: &str = "binding:env:attribute";

/// What a single marker asks the retriever to do with a field's value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Marker {
    /// The value names a secret; bind `item`, or every key when `None`
    Secret {
        /// Requested secret key
        item: Option<String>,
    },
    /// The value names a config map; bind `item`, or every key when `None`
    ConfigMap {
        /// Requested config map key
        item: Option<String>,
    },
    /// The value names a secret to bind and to mount as a volume
    VolumeMountSecret {
        /// Requested secret key
        item: Option<String>,
    },
    /// The value is stored as-is
    Attribute,
    /// Not a binding marker
    Ignored,
}

impl Marker {
    /// Classify a marker string
    ///
    /// Prefixes are tried most specific first and must end on a `:` boundary,
    /// so `binding:env:object:secretive` is ignored rather than read as a
    /// secret reference.
    pub fn classify(marker: &str) -> Self {
        if let Some(item) = suffix(marker, SECRET_PREFIX) {
            Marker::Secret { item }
        } else if let Some(item) = suffix(marker, CONFIG_MAP_PREFIX) {
            Marker::ConfigMap { item }
        } else if let Some(item) = suffix(marker, VOLUME_MOUNT_SECRET_PREFIX) {
            Marker::VolumeMountSecret { item }
        } else if suffix(marker, ATTRIBUTE_PREFIX).is_some() {
            Marker::Attribute
        } else {
            Marker::Ignored
        }
    }
}

/// Match `prefix` on a boundary and return the item suffix
///
/// Outer `None` means no match; inner `None` means no (or an empty) item.
fn suffix(marker: &str, prefix: &str) -> Option<Option<String>> {
    let rest = marker.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some(None);
    }
    let item = rest.strip_prefix(':')?;
    Some((!item.is_empty()).then(|| item.to_string()))
}

/// Items requested from one secret or config map
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestedItems {
    /// Every key of the resource is wanted
    pub all: bool,
    /// Individually requested keys
    pub names: BTreeSet<String>,
}

impl RequestedItems {
    /// Record a request for `item`, or for the whole resource when `None`
    pub fn request(&mut self, item: Option<String>) {
        match item {
            Some(name) => {
                self.names.insert(name);
            }
            None => self.all = true,
        }
    }

    /// Whether `key` was requested
    pub fn contains(&self, key: &str) -> bool {
        self.all || self.names.contains(key)
    }
}

/// Auxiliary resources referenced while classifying one section
///
/// Keyed by resource name, in order of first reference, so every distinct
/// resource is fetched once per section.
#[derive(Clone, Debug, Default)]
pub struct BindingRequests {
    /// Secret name to requested items
    pub secrets: IndexMap<String, RequestedItems>,
    /// Config map name to requested items
    pub config_maps: IndexMap<String, RequestedItems>,
}

impl BindingRequests {
    /// Record a secret reference
    pub fn request_secret(&mut self, name: &str, item: Option<String>) {
        self.secrets
            .entry(name.to_string())
            .or_default()
            .request(item);
    }

    /// Record a config map reference
    pub fn request_config_map(&mut self, name: &str, item: Option<String>) {
        self.config_maps
            .entry(name.to_string())
            .or_default()
            .request(item);
    }

    /// Whether nothing needs to be fetched
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty() && self.config_maps.is_empty()
    }
}
