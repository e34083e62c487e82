//! Directory user model.

use super::{AttributeDescriptor, AttributeStore, Field, Model, ModelSchema};

/// A user record.
///
/// | Field | External key | Multiple |
/// |-------|--------------|----------|
/// | `id` | `apple-generateduid` | no |
/// | `username` | `uid` | no |
/// | `email` | `mail` | yes |
/// | `full_name` | `cn` | no |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User(AttributeStore);

impl User {
    /// The user's generated unique id.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.first("id")
    }

    /// The short name.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.0.first("username")
    }

    /// Every email address.
    #[must_use]
    pub fn email(&self) -> &[String] {
        self.0.all("email")
    }

    /// The full name.
    #[must_use]
    pub fn full_name(&self) -> Option<&str> {
        self.0.first("full_name")
    }
}

impl Model for User {
    const SCHEMA: &'static ModelSchema = &ModelSchema::new(
        "User",
        &[
            Field::new("id", AttributeDescriptor::single("apple-generateduid")),
            Field::new("username", AttributeDescriptor::single("uid")),
            Field::new("email", AttributeDescriptor::multiple("mail")),
            Field::new("full_name", AttributeDescriptor::single("cn")),
        ],
    );

    fn from_store(store: AttributeStore) -> Self {
        Self(store)
    }

    fn store(&self) -> &AttributeStore {
        &self.0
    }

    fn store_mut(&mut self) -> &mut AttributeStore {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entry;

    #[test]
    fn test_schema_is_valid() {
        assert!(User::SCHEMA.validate().is_ok());
        assert_eq!(User::query_location(), "users");
        assert_eq!(
            User::external_keys(),
            vec!["apple-generateduid", "uid", "mail", "cn"]
        );
    }

    #[test]
    fn test_from_entry() {
        let entry = Entry::new("uid=alice,cn=users,dc=example,dc=com")
            .with("uid", ["alice"])
            .with("mail", ["alice@example.com", "a@example.com"])
            .with("cn", ["Alice A"]);
        let user = User::from_entry(&entry);
        assert_eq!(user.username(), Some("alice"));
        assert_eq!(user.full_name(), Some("Alice A"));
        assert_eq!(user.email().len(), 2);
        assert_eq!(user.id(), None);
    }

    #[test]
    fn test_dynamic_access_by_field_or_key() {
        let mut user = User::empty();
        user.set("apple-generateduid", "123").unwrap();
        assert_eq!(user.id(), Some("123"));
        assert_eq!(user.get("id"), user.get("apple-generateduid"));
    }

    #[test]
    fn test_render() {
        let mut user = User::empty();
        user.set("username", "alice").unwrap();
        user.set("email", ["alice@example.com"]).unwrap();
        assert_eq!(
            user.render(),
            "User(id=None, username='alice', email=['alice@example.com'], full_name=None)"
        );
    }
}
