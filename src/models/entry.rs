//! Raw directory entries.

use std::collections::BTreeMap;

/// A record returned by the directory: a distinguished name plus a mapping of
/// external key to the list of string values reported for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// External key → values, as reported by the directory.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Entry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) an attribute.
    #[must_use]
    pub fn with<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the values for an external key.
    #[must_use]
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.attributes.get(key).map(Vec::as_slice)
    }

    /// Returns `true` if at least one attribute carries at least one value.
    ///
    /// Some directories answer an unfiltered search with a leading
    /// pseudo-record whose attributes are all empty lists. Such entries have
    /// no content and are dropped from bulk results.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.attributes.values().any(|values| !values.is_empty())
    }
}
