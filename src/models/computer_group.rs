//! Computer group model.

use super::{AttributeDescriptor, AttributeStore, Field, Membership, Model, ModelSchema};

/// A group of computers, searched under `cn=computer_groups`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputerGroup(AttributeStore);

impl ComputerGroup {
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

    /// Names of member computers.
    #[must_use]
    pub fn computer_names(&self) -> &[String] {
        self.0.all("computer_names")
    }

    /// Ids of member computers.
    #[must_use]
    pub fn computer_ids(&self) -> &[String] {
        self.0.all("computer_ids")
    }

    /// Checks a computer name or id against both member lists.
    #[must_use]
    pub fn has_computer(&self, computer: &str) -> bool {
        self.computer_names().iter().any(|name| name == computer)
            || self.computer_ids().iter().any(|id| id == computer)
    }
}

impl Model for ComputerGroup {
    const SCHEMA: &'static ModelSchema = &ModelSchema::new(
        "ComputerGroup",
        &[
            Field::new("id", AttributeDescriptor::single("apple-generateduid")),
            Field::new("group_name", AttributeDescriptor::single("cn")),
            Field::new("computer_names", AttributeDescriptor::multiple("memberUid")),
            Field::new("computer_ids", AttributeDescriptor::multiple("apple-group-memberguid")),
        ],
    )
    .with_location("cn=computer_groups");

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

impl Membership for ComputerGroup {
    const NAME_FIELD: &'static str = "group_name";

    fn has_member(&self, member: &str) -> bool {
        self.has_computer(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entry;

    #[test]
    fn test_location_override() {
        assert!(ComputerGroup::SCHEMA.validate().is_ok());
        assert_eq!(ComputerGroup::query_location(), "cn=computer_groups");
    }

    #[test]
    fn test_has_computer() {
        let group = ComputerGroup::from_entry(
            &Entry::new("cn=lab")
                .with("memberUid", ["lab-01"])
                .with("apple-group-memberguid", ["ABC-123"]),
        );
        assert!(group.has_computer("lab-01"));
        assert!(group.has_member("ABC-123"));
        assert!(!group.has_computer("lab-02"));
    }
}
