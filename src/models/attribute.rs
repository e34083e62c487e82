//! Attribute descriptors.
//!
//! An [`AttributeDescriptor`] maps one model field onto the directory-native
//! key it is stored under, and says whether the field holds one value or many.
//! Directories always report values as lists; single-valued descriptors
//! collapse that list to its first element.

use serde::Serialize;
use std::fmt;

/// Declares one mapped field of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeDescriptor {
    external_key: &'static str,
    allow_multiple: bool,
}

impl AttributeDescriptor {
    /// A single-valued attribute stored under `external_key`.
    #[must_use]
    pub const fn single(external_key: &'static str) -> Self {
        Self {
            external_key,
            allow_multiple: false,
        }
    }

    /// A multi-valued attribute stored under `external_key`.
    #[must_use]
    pub const fn multiple(external_key: &'static str) -> Self {
        Self {
            external_key,
            allow_multiple: true,
        }
    }

    /// The directory-native key.
    #[must_use]
    pub const fn external_key(&self) -> &'static str {
        self.external_key
    }

    /// Whether every stored value is returned, or only the first.
    #[must_use]
    pub const fn allow_multiple(&self) -> bool {
        self.allow_multiple
    }

    /// Resolves raw directory values according to the multiplicity.
    ///
    /// Single-valued: the first value, or `None` for an empty list.
    /// Multi-valued: the full list in order, possibly empty.
    #[must_use]
    pub fn resolve(&self, raw: &[String]) -> AttributeValue {
        if self.allow_multiple {
            AttributeValue::Multiple(raw.to_vec())
        } else {
            AttributeValue::Single(raw.first().cloned())
        }
    }
}

impl fmt::Display for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.external_key)
    }
}

/// A resolved attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Value of a single-valued attribute.
    Single(Option<String>),
    /// Values of a multi-valued attribute.
    Multiple(Vec<String>),
}

impl AttributeValue {
    /// Returns the single value, if this is a set single-valued attribute.
    #[must_use]
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(value) => value.as_deref(),
            Self::Multiple(_) => None,
        }
    }

    /// Returns the values as a slice; a single value is a one-element slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::Single(Some(value)) => std::slice::from_ref(value),
            Self::Single(None) => &[],
            Self::Multiple(values) => values,
        }
    }

    /// Returns `true` if no value is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

/// Renders the value for `Model::render`: strings quoted, absent as `None`.
impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(Some(value)) => write!(f, "'{value}'"),
            Self::Single(None) => f.write_str("None"),
            Self::Multiple(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{value}'")?;
                }
                f.write_str("]")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_single_resolves_first_or_none() {
        let descriptor = AttributeDescriptor::single("uid");
        assert_eq!(descriptor.resolve(&[]), AttributeValue::Single(None));
        assert_eq!(
            descriptor.resolve(&values(&["alice", "bob"])),
            AttributeValue::Single(Some("alice".to_string()))
        );
    }

    #[test]
    fn test_multiple_resolves_full_list() {
        let descriptor = AttributeDescriptor::multiple("mail");
        assert_eq!(descriptor.resolve(&[]), AttributeValue::Multiple(Vec::new()));
        assert_eq!(
            descriptor.resolve(&values(&["a@example.com", "b@example.com"])),
            AttributeValue::Multiple(values(&["a@example.com", "b@example.com"]))
        );
    }

    #[test]
    fn test_display_uses_external_key() {
        assert_eq!(AttributeDescriptor::single("cn").to_string(), "cn");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(AttributeValue::Single(None).to_string(), "None");
        assert_eq!(
            AttributeValue::Single(Some("x".to_string())).to_string(),
            "'x'"
        );
        assert_eq!(
            AttributeValue::Multiple(values(&["a", "b"])).to_string(),
            "['a', 'b']"
        );
    }

    #[test]
    fn test_as_slice() {
        assert!(AttributeValue::Single(None).as_slice().is_empty());
        assert_eq!(
            AttributeValue::Single(Some("x".to_string())).as_slice(),
            ["x".to_string()]
        );
        assert!(AttributeValue::Multiple(Vec::new()).is_empty());
    }
}
