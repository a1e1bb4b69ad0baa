//! Validator resolver cache.
//!
//! Some log records only carry a validator's short address. The cache maps
//! that short form to the full address and display name. The whole mapping
//! is swapped in one step on every refresh, so readers see either the old
//! table or the new one, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Name used for validators missing from the directory.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Shortest address that gets abbreviated.
const SHORT_FORM_MIN_LEN: usize = 10;

/// Short address → record.
pub type ValidatorMap = HashMap<String, ValidatorRecord>;

/// One validator as known to the directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorRecord {
    pub short_address: String,
    pub full_address: String,
    pub name: String,
}

impl ValidatorRecord {
    pub fn new(full_address: impl Into<String>, name: Option<String>) -> Self {
        let full_address = full_address.into();
        Self {
            short_address: short_address(&full_address),
            full_address,
            name: name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        }
    }

    /// Placeholder for a short address the directory does not know.
    pub fn unknown(short_address: &str) -> Self {
        Self {
            short_address: short_address.to_string(),
            full_address: short_address.to_string(),
            name: UNKNOWN_NAME.to_string(),
        }
    }
}

/// Abbreviates a full address the way the node's logs do: the first six
/// characters, `..`, then the last four. Short inputs are returned as is.
pub fn short_address(full: &str) -> String {
    let chars: Vec<char> = full.chars().collect();
    if chars.len() < SHORT_FORM_MIN_LEN {
        return full.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}..{tail}")
}

/// Read-mostly lookup table shared between the consensus pipeline and the
/// directory refresher.
#[derive(Debug, Default)]
pub struct ValidatorResolver {
    map: ArcSwap<ValidatorMap>,
}

impl ValidatorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, short_address: &str) -> Option<ValidatorRecord> {
        self.map.load().get(short_address).cloned()
    }

    /// Like [`lookup`](Self::lookup), falling back to
    /// [`ValidatorRecord::unknown`] on a miss.
    pub fn resolve(&self, short_address: &str) -> ValidatorRecord {
        self.lookup(short_address)
            .unwrap_or_else(|| ValidatorRecord::unknown(short_address))
    }

    /// Replaces the whole mapping. Entries absent from `map` are gone.
    pub fn replace(&self, map: ValidatorMap) {
        self.map.store(Arc::new(map));
    }

    /// Current mapping. Stays valid even if a refresh happens meanwhile.
    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Arc<ValidatorMap> {
        self.map.load_full()
    }

    pub fn len(&self) -> usize {
        self.map.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.load().is_empty()
    }
}

/// Builds a mapping keyed by each record's short address.
pub fn map_from_records(records: impl IntoIterator<Item = ValidatorRecord>) -> ValidatorMap {
    records
        .into_iter()
        .map(|r| (r.short_address.clone(), r))
        .collect()
}
