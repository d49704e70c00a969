//! In-memory accumulation of resolved binding data

use std::collections::BTreeMap;

use tracing::debug;

use crate::naming::{KeyNamer, KeySource};

/// Resolved (aggregate key, value) pairs for one run
///
/// Later writes to the same key replace earlier ones.
#[derive(Clone, Debug)]
pub struct AggregateStore {
    namer: KeyNamer,
    data: BTreeMap<String, Vec<u8>>,
}

impl AggregateStore {
    /// Create an empty store naming keys with `namer`
    pub fn new(namer: KeyNamer) -> Self {
        Self {
            namer,
            data: BTreeMap::new(),
        }
    }

    /// Name `raw_key` and store `value` under the resulting aggregate key
    pub fn store(&mut self, source: KeySource, raw_key: &str, value: Vec<u8>) {
        let key = self.namer.name(source, raw_key);
        if self.data.insert(key.clone(), value).is_some() {
            debug!(key = %key, "overwriting previously stored binding key");
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All stored data
    pub fn data(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.data
    }
}
