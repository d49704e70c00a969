//! Retriever configuration

use std::fmt;
use std::str::FromStr;

use crate::descriptor::RequestedItems;

/// Default number of auxiliary resources fetched at once
pub const DEFAULT_FETCH_CONCURRENCY: usize = 1;

/// Which keys of a referenced secret or config map end up in the aggregate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ItemSelection {
    /// Only keys named by a marker (or every key when a marker names none)
    #[default]
    Requested,
    /// Every key present in the resource's data
    All,
}

impl ItemSelection {
    /// Whether `key` should be stored given what was requested
    pub fn includes(&self, requested: &RequestedItems, key: &str) -> bool {
        match self {
            ItemSelection::All => true,
            ItemSelection::Requested => requested.contains(key),
        }
    }
}

impl FromStr for ItemSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requested" => Ok(ItemSelection::Requested),
            "all" => Ok(ItemSelection::All),
            other => Err(format!(
                "unknown item selection '{other}' (expected 'requested' or 'all')"
            )),
        }
    }
}

impl fmt::Display for ItemSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemSelection::Requested => f.write_str("requested"),
            ItemSelection::All => f.write_str("all"),
        }
    }
}

/// Settings for one retriever
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrieverConfig {
    /// Prefix prepended to every aggregate key
    pub binding_prefix: Option<String>,
    /// Key filtering for referenced resources
    pub item_selection: ItemSelection,
    /// Maximum number of auxiliary resources fetched concurrently (min 1)
    pub fetch_concurrency: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            binding_prefix: None,
            item_selection: ItemSelection::default(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }
}

impl RetrieverConfig {
    /// Set the binding prefix
    pub fn with_binding_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.binding_prefix = Some(prefix.into());
        self
    }

    /// Set the item selection mode
    pub fn with_item_selection(mut self, selection: ItemSelection) -> Self {
        self.item_selection = selection;
        self
    }

    /// Set the fetch concurrency
    pub fn with_fetch_concurrency(mut self, limit: usize) -> Self {
        self.fetch_concurrency = limit;
        self
    }
}
