//! Group models and membership.
//!
//! Authorization runs against any model implementing [`Membership`]: it
//! names the field a group is looked up by and answers whether an
//! identifier belongs to the group.

use super::{AttributeDescriptor, AttributeStore, Field, Model, ModelSchema};

/// A group-like model that can answer membership questions.
pub trait Membership: Model {
    /// Field the group is looked up by when searching for it by name.
    const NAME_FIELD: &'static str;

    /// Returns `true` if `member` belongs to the group.
    fn has_member(&self, member: &str) -> bool;
}

/// A user group.
///
/// | Field | External key | Multiple |
/// |-------|--------------|----------|
/// | `id` | `apple-generateduid` | no |
/// | `group_name` | `cn` | no |
/// | `full_name` | `apple-group-realname` | no |
/// | `users` | `memberUid` | yes |
/// | `member_ids` | `apple-group-memberguid` | yes |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group(AttributeStore);

impl Group {
    /// The group's generated unique id.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.first("id")
    }

    /// The short group name.
    #[must_use]
    pub fn group_name(&self) -> Option<&str> {
        self.0.first("group_name")
    }

    /// The descriptive group name.
    #[must_use]
    pub fn full_name(&self) -> Option<&str> {
        self.0.first("full_name")
    }

    /// Usernames of the members.
    #[must_use]
    pub fn users(&self) -> &[String] {
        self.0.all("users")
    }

    /// Unique ids of the members.
    #[must_use]
    pub fn member_ids(&self) -> &[String] {
        self.0.all("member_ids")
    }

    /// Checks a username or user id against both member lists.
    #[must_use]
    pub fn has_user(&self, user: &str) -> bool {
        self.users().iter().any(|u| u == user) || self.member_ids().iter().any(|id| id == user)
    }
}

impl Model for Group {
    const SCHEMA: &'static ModelSchema = &ModelSchema::new(
        "Group",
        &[
            Field::new("id", AttributeDescriptor::single("apple-generateduid")),
            Field::new("group_name", AttributeDescriptor::single("cn")),
            Field::new("full_name", AttributeDescriptor::single("apple-group-realname")),
            Field::new("users", AttributeDescriptor::multiple("memberUid")),
            Field::new("member_ids", AttributeDescriptor::multiple("apple-group-memberguid")),
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

impl Membership for Group {
    const NAME_FIELD: &'static str = "group_name";

    fn has_member(&self, member: &str) -> bool {
        self.has_user(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entry;

    fn admins() -> Group {
        Group::from_entry(
            &Entry::new("cn=admins,cn=groups,dc=example,dc=com")
                .with("cn", ["admins"])
                .with("memberUid", ["alice", "bob"])
                .with("apple-group-memberguid", ["C0FFEE"]),
        )
    }

    #[test]
    fn test_schema_is_valid() {
        assert!(Group::SCHEMA.validate().is_ok());
        assert_eq!(Group::query_location(), "groups");
    }

    #[test]
    fn test_has_member_by_username_or_id() {
        let group = admins();
        assert!(group.has_member("bob"));
        assert!(group.has_member("C0FFEE"));
        assert!(!group.has_member("mallory"));
    }

    #[test]
    fn test_absent_lists_are_no_match() {
        let group = Group::from_entry(&Entry::new("cn=empty").with("cn", ["empty"]));
        assert!(group.users().is_empty());
        assert!(!group.has_member("alice"));
    }

    #[test]
    fn test_accessors() {
        let group = admins();
        assert_eq!(group.group_name(), Some("admins"));
        assert_eq!(group.full_name(), None);
        assert_eq!(group.users(), ["alice".to_string(), "bob".to_string()]);
    }
}
