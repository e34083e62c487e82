//! Model schemas and the value store behind every model.
//!
//! A model is declared as a static [`ModelSchema`]: an ordered list of
//! [`Field`]s, each pairing a field name with an [`AttributeDescriptor`].
//! The schema is the explicit two-way mapping between field names and
//! external keys. Model instances keep their raw values in an
//! [`AttributeStore`], keyed by canonical field name.
//!
//! # Example
//!
//! ```rust,ignore
//! use opendir::models::{AttributeDescriptor, AttributeStore, Field, Model, ModelSchema};
//!
//! pub struct Printer(AttributeStore);
//!
//! impl Model for Printer {
//!     const SCHEMA: &'static ModelSchema = &ModelSchema::new(
//!         "Printer",
//!         &[
//!             Field::new("name", AttributeDescriptor::single("cn")),
//!             Field::new("queues", AttributeDescriptor::multiple("printerQueue")),
//!         ],
//!     );
//!
//!     fn from_store(store: AttributeStore) -> Self { Self(store) }
//!     fn store(&self) -> &AttributeStore { &self.0 }
//!     fn store_mut(&mut self) -> &mut AttributeStore { &mut self.0 }
//! }
//! ```

use super::{AttributeDescriptor, AttributeValue, Entry};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};

/// One declared field: a field name and its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    name: &'static str,
    descriptor: AttributeDescriptor,
}

impl Field {
    /// Declares a field.
    #[must_use]
    pub const fn new(name: &'static str, descriptor: AttributeDescriptor) -> Self {
        Self { name, descriptor }
    }

    /// The field name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The field's descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }
}

/// Static schema of a model.
#[derive(Debug, PartialEq, Eq)]
pub struct ModelSchema {
    name: &'static str,
    location: Option<&'static str>,
    fields: &'static [Field],
}

impl ModelSchema {
    /// Declares a schema. Field order is the declaration order.
    #[must_use]
    pub const fn new(name: &'static str, fields: &'static [Field]) -> Self {
        Self {
            name,
            location: None,
            fields,
        }
    }

    /// Overrides the default search-location fragment.
    #[must_use]
    pub const fn with_location(mut self, location: &'static str) -> Self {
        self.location = Some(location);
        self
    }

    /// The model name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The declared fields in order.
    #[must_use]
    pub const fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Checks that field names and external keys are each unique.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        for field in self.fields {
            if !names.insert(field.name) {
                return Err(Error::Configuration(format!(
                    "model '{}' declares field '{}' twice",
                    self.name, field.name
                )));
            }
            if !keys.insert(field.descriptor.external_key()) {
                return Err(Error::Configuration(format!(
                    "model '{}' maps external key '{}' twice",
                    self.name,
                    field.descriptor.external_key()
                )));
            }
        }
        Ok(())
    }

    /// Field name → external key, in declaration order.
    #[must_use]
    pub fn field_external_key_map(&self) -> Vec<(&'static str, &'static str)> {
        self.fields
            .iter()
            .map(|field| (field.name, field.descriptor.external_key()))
            .collect()
    }

    /// Every external key the model requests from the directory.
    #[must_use]
    pub fn external_keys(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .map(|field| field.descriptor.external_key())
            .collect()
    }

    /// Finds the field addressed by `key`, which may be an external key or a
    /// field name. External keys are checked first.
    #[must_use]
    pub fn field_for(&self, key: &str) -> Option<&'static Field> {
        self.fields
            .iter()
            .find(|field| field.descriptor.external_key() == key)
            .or_else(|| self.fields.iter().find(|field| field.name == key))
    }

    /// Descriptor for a field name or external key.
    #[must_use]
    pub fn descriptor_for(&self, key: &str) -> Option<&'static AttributeDescriptor> {
        self.field_for(key).map(|field| &field.descriptor)
    }

    /// Default search-location fragment.
    ///
    /// The override if one is declared, otherwise the lower-cased model name
    /// with an `s` appended (`User` → `users`).
    #[must_use]
    pub fn query_location(&self) -> String {
        self.location.map_or_else(
            || format!("{}s", self.name.to_lowercase()),
            ToString::to_string,
        )
    }
}

/// Raw values for one attribute, as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawValues(Vec<String>);

impl RawValues {
    /// Consumes the wrapper.
    #[must_use]
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for RawValues {
    fn from(value: &str) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<String> for RawValues {
    fn from(value: String) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<String>> for RawValues {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

impl From<&[String]> for RawValues {
    fn from(values: &[String]) -> Self {
        Self(values.to_vec())
    }
}

impl From<Vec<&str>> for RawValues {
    fn from(values: Vec<&str>) -> Self {
        Self(values.into_iter().map(ToString::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for RawValues {
    fn from(values: [&str; N]) -> Self {
        Self(values.into_iter().map(ToString::to_string).collect())
    }
}

/// Value store of a model instance.
///
/// Only declared fields are ever stored, always under the canonical field
/// name regardless of whether the field or its external key was used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeStore {
    schema: &'static ModelSchema,
    values: BTreeMap<&'static str, Vec<String>>,
}

impl AttributeStore {
    /// Creates an empty store for a schema.
    #[must_use]
    pub const fn new(schema: &'static ModelSchema) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
        }
    }

    /// Builds a store from a raw entry. Keys the schema does not declare are
    /// ignored.
    #[must_use]
    pub fn from_entry(schema: &'static ModelSchema, entry: &Entry) -> Self {
        let mut store = Self::new(schema);
        for (key, values) in &entry.attributes {
            if let Some(field) = schema.field_for(key) {
                store.values.insert(field.name(), values.clone());
            }
        }
        store
    }

    /// The schema this store belongs to.
    #[must_use]
    pub const fn schema(&self) -> &'static ModelSchema {
        self.schema
    }

    /// Sets a value, returning the store for chaining.
    pub fn with(mut self, key: &str, values: impl Into<RawValues>) -> Result<Self> {
        self.set(key, values)?;
        Ok(self)
    }

    /// Stores values under the canonical field name.
    pub fn set(&mut self, key: &str, values: impl Into<RawValues>) -> Result<()> {
        let field = self.field(key)?;
        self.values.insert(field.name(), values.into().into_inner());
        Ok(())
    }

    /// Resolved value for a field name or external key.
    ///
    /// Returns `None` when the name is not declared by the schema. An
    /// unset declared field resolves like an empty value list.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<AttributeValue> {
        let field = self.schema.field_for(key)?;
        Some(field.descriptor().resolve(self.raw_for(field)))
    }

    /// Like [`AttributeStore::get`], but an undeclared name is an error.
    pub fn try_get(&self, key: &str) -> Result<AttributeValue> {
        let field = self.field(key)?;
        Ok(field.descriptor().resolve(self.raw_for(field)))
    }

    /// Raw stored values for a field name or external key.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<&[String]> {
        let field = self.schema.field_for(key)?;
        self.values.get(field.name()).map(Vec::as_slice)
    }

    /// First raw value of a field; what a single-valued accessor returns.
    #[must_use]
    pub fn first(&self, key: &str) -> Option<&str> {
        self.raw(key)
            .and_then(<[String]>::first)
            .map(String::as_str)
    }

    /// All raw values of a field; empty when unset or undeclared.
    #[must_use]
    pub fn all(&self, key: &str) -> &[String] {
        self.raw(key).unwrap_or_default()
    }

    /// Converts back into a raw entry keyed by external keys.
    #[must_use]
    pub fn to_entry(&self, dn: impl Into<String>) -> Entry {
        let mut entry = Entry::new(dn);
        for field in self.schema.fields() {
            if let Some(values) = self.values.get(field.name()) {
                entry
                    .attributes
                    .insert(field.descriptor().external_key().to_string(), values.clone());
            }
        }
        entry
    }

    /// Human-readable rendering: `Name(field='value', list=['a'], unset=None)`.
    #[must_use]
    pub fn render(&self) -> String {
        let fields: Vec<String> = self
            .schema
            .fields()
            .iter()
            .map(|field| {
                let value = field.descriptor().resolve(self.raw_for(field));
                let value = match value {
                    // Unset multi-valued fields render as absent, not as [].
                    AttributeValue::Multiple(_) if !self.values.contains_key(field.name()) => {
                        AttributeValue::Single(None)
                    },
                    other => other,
                };
                format!("{}={value}", field.name())
            })
            .collect();
        format!("{}({})", self.schema.name(), fields.join(", "))
    }

    fn raw_for(&self, field: &Field) -> &[String] {
        self.values.get(field.name()).map_or(&[], Vec::as_slice)
    }

    fn field(&self, key: &str) -> Result<&'static Field> {
        self.schema
            .field_for(key)
            .ok_or_else(|| Error::UnknownAttribute {
                model: self.schema.name().to_string(),
                name: key.to_string(),
            })
    }
}

/// A typed model backed by a static schema.
///
/// Implementors declare `SCHEMA` and give access to their [`AttributeStore`];
/// every other operation has a default implementation driven by the schema.
/// Typed accessors on the implementing struct are the ordinary way to read a
/// field; `get`/`set` address fields dynamically by field name or external key.
pub trait Model: Sized {
    /// The model's schema.
    const SCHEMA: &'static ModelSchema;

    /// Wraps a value store.
    fn from_store(store: AttributeStore) -> Self;

    /// The value store.
    fn store(&self) -> &AttributeStore;

    /// The value store, mutably.
    fn store_mut(&mut self) -> &mut AttributeStore;

    /// An instance with no values set.
    fn empty() -> Self {
        Self::from_store(AttributeStore::new(Self::SCHEMA))
    }

    /// Descriptor for a field name or external key.
    fn descriptor_for(key: &str) -> Option<&'static AttributeDescriptor> {
        Self::SCHEMA.descriptor_for(key)
    }

    /// Field name → external key, in declaration order.
    fn field_external_key_map() -> Vec<(&'static str, &'static str)> {
        Self::SCHEMA.field_external_key_map()
    }

    /// External keys requested from the directory.
    fn external_keys() -> Vec<&'static str> {
        Self::SCHEMA.external_keys()
    }

    /// Default search-location fragment.
    fn query_location() -> String {
        Self::SCHEMA.query_location()
    }

    /// Builds an instance from a raw entry, ignoring undeclared keys.
    fn from_entry(entry: &Entry) -> Self {
        Self::from_store(AttributeStore::from_entry(Self::SCHEMA, entry))
    }

    /// Converts the instance into a raw entry keyed by external keys.
    fn to_entry(&self, dn: impl Into<String>) -> Entry {
        self.store().to_entry(dn)
    }

    /// Resolved value by field name or external key; `None` if undeclared.
    fn get(&self, key: &str) -> Option<AttributeValue> {
        self.store().get(key)
    }

    /// Resolved value by field name or external key.
    fn try_get(&self, key: &str) -> Result<AttributeValue> {
        self.store().try_get(key)
    }

    /// Stores values under the canonical field name.
    fn set(&mut self, key: &str, values: impl Into<RawValues>) -> Result<()> {
        self.store_mut().set(key, values)
    }

    /// Human-readable rendering of every field.
    fn render(&self) -> String {
        self.store().render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static PRINTER: ModelSchema = ModelSchema::new(
        "Printer",
        &[
            Field::new("name", AttributeDescriptor::single("cn")),
            Field::new("queues", AttributeDescriptor::multiple("printerQueue")),
        ],
    );

    static CLASHING: ModelSchema = ModelSchema::new(
        "Clashing",
        &[
            Field::new("name", AttributeDescriptor::single("cn")),
            Field::new("title", AttributeDescriptor::single("cn")),
        ],
    );

    static SELF_NAMED: ModelSchema = ModelSchema::new(
        "Odd",
        &[
            Field::new("uid", AttributeDescriptor::single("apple-generateduid")),
            Field::new("username", AttributeDescriptor::single("uid")),
        ],
    );

    #[test]
    fn test_validate() {
        assert!(PRINTER.validate().is_ok());
        let err = CLASHING.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_descriptor_for_field_and_key() {
        let by_field = PRINTER.descriptor_for("queues").unwrap();
        let by_key = PRINTER.descriptor_for("printerQueue").unwrap();
        assert_eq!(by_field, by_key);
        assert!(PRINTER.descriptor_for("location").is_none());
    }

    #[test]
    fn test_external_key_checked_before_field_name() {
        // "uid" is both a field name and another field's external key.
        let field = SELF_NAMED.field_for("uid").unwrap();
        assert_eq!(field.name(), "username");
    }

    #[test]
    fn test_default_query_location() {
        assert_eq!(PRINTER.query_location(), "printers");
        let custom = ModelSchema::new("Printer", &[]).with_location("cn=printers");
        assert_eq!(custom.query_location(), "cn=printers");
    }

    #[test]
    fn test_store_set_by_key_reads_by_field() {
        let mut store = AttributeStore::new(&PRINTER);
        store.set("cn", "laser").unwrap();
        assert_eq!(
            store.get("name"),
            Some(AttributeValue::Single(Some("laser".to_string())))
        );
        assert_eq!(store.raw("name"), Some(["laser".to_string()].as_slice()));
    }

    #[test]
    fn test_store_rejects_undeclared() {
        let mut store = AttributeStore::new(&PRINTER);
        let err = store.set("location", "lobby").unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute { .. }));
        assert!(store.get("location").is_none());
        assert!(store.try_get("location").is_err());
    }

    #[test]
    fn test_from_entry_ignores_unknown_keys() {
        let entry = Entry::new("cn=laser")
            .with("cn", ["laser"])
            .with("printerQueue", ["a", "b"])
            .with("objectClass", ["printer"]);
        let store = AttributeStore::from_entry(&PRINTER, &entry);
        assert_eq!(
            store.get("queues"),
            Some(AttributeValue::Multiple(vec!["a".to_string(), "b".to_string()]))
        );
        assert_eq!(store.to_entry("cn=laser").attributes.len(), 2);
    }

    #[test]
    fn test_render() {
        let store = AttributeStore::new(&PRINTER).with("name", "laser").unwrap();
        assert_eq!(store.render(), "Printer(name='laser', queues=None)");
        let store = store.with("queues", ["a"]).unwrap();
        assert_eq!(store.render(), "Printer(name='laser', queues=['a'])");
    }
}
