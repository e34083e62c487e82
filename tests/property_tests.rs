//! Property-based tests for attribute mapping and query construction.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Single-valued descriptors resolve to the first value or nothing
//! - Multi-valued descriptors resolve to the exact sequence
//! - Models survive conversion to a raw entry and back
//! - Criteria filters keep their order and escape their values
//! - Base locations are derived from host names

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use opendir::directory::base_dn_from_server;
use opendir::directory::memory::MemoryDirectory;
use opendir::services::filter;
use opendir::{AttributeDescriptor, AttributeValue, Group, Model, Query, UnitOfWork, User};
use proptest::prelude::*;

fn value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .@_-]{1,24}"
}

fn values() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(value(), 0..6)
}

proptest! {
    /// Property: a single-valued descriptor yields the first raw value.
    #[test]
    fn prop_single_resolves_first(raw in values()) {
        let resolved = AttributeDescriptor::single("uid").resolve(&raw);
        prop_assert_eq!(resolved, AttributeValue::Single(raw.first().cloned()));
    }

    /// Property: a multi-valued descriptor yields the raw values unchanged.
    #[test]
    fn prop_multiple_resolves_all(raw in values()) {
        let resolved = AttributeDescriptor::multiple("mail").resolve(&raw);
        prop_assert_eq!(resolved, AttributeValue::Multiple(raw));
    }

    /// Property: field name and external key address the same descriptor.
    #[test]
    fn prop_descriptor_addressable_both_ways(idx in 0usize..4) {
        let (field, key) = User::field_external_key_map()[idx];
        prop_assert_eq!(User::descriptor_for(field), User::descriptor_for(key));
        prop_assert!(User::descriptor_for(field).is_some());
    }

    /// Property: `from_entry(to_entry(m))` preserves every declared field.
    #[test]
    fn prop_user_round_trip(
        id in prop::option::of(value()),
        username in prop::option::of(value()),
        email in values(),
        full_name in prop::option::of(value()),
    ) {
        let mut user = User::empty();
        if let Some(id) = &id {
            user.set("id", id.as_str()).unwrap();
        }
        if let Some(username) = &username {
            user.set("username", username.as_str()).unwrap();
        }
        user.set("email", email.clone()).unwrap();
        if let Some(full_name) = &full_name {
            user.set("full_name", full_name.as_str()).unwrap();
        }

        let restored = User::from_entry(&user.to_entry("uid=x,cn=users"));
        for (field, _) in User::field_external_key_map() {
            prop_assert_eq!(restored.get(field), user.get(field));
        }
        prop_assert_eq!(restored.username(), username.as_deref());
        prop_assert_eq!(restored.email(), email.as_slice());
    }

    /// Property: group members are found by username or id, nobody else.
    #[test]
    fn prop_group_membership(
        users in prop::collection::vec("[a-z]{3,8}", 0..5),
        ids in prop::collection::vec("[A-F0-9]{8}", 0..5),
        probe in "[a-z]{3,8}",
    ) {
        let mut group = Group::empty();
        group.set("users", users.clone()).unwrap();
        group.set("member_ids", ids.clone()).unwrap();

        for user in &users {
            prop_assert!(group.has_user(user));
        }
        for id in &ids {
            prop_assert!(group.has_user(id));
        }
        prop_assert_eq!(group.has_user(&probe), users.contains(&probe));
    }

    /// Property: criteria are AND-combined in the order supplied.
    #[test]
    fn prop_criteria_order(pairs in prop::collection::vec(("[a-z]{1,8}", "[a-z0-9]{1,8}"), 2..5)) {
        let criteria: Vec<(String, String)> = pairs.clone();
        let built = filter::from_criteria(&criteria, None).unwrap();

        let expected: String = pairs.iter().map(|(k, v)| format!("({k}={v})")).collect();
        prop_assert_eq!(built, format!("(&{expected})"));
    }

    /// Property: escaped criterion values never break the filter's structure.
    #[test]
    fn prop_criterion_balanced(value in "[ -~]{0,24}") {
        let built = filter::criterion("cn", &value);
        let opens = built.matches('(').count();
        let closes = built.matches(')').count();
        prop_assert_eq!(opens, 1);
        prop_assert_eq!(closes, 1);
        prop_assert!(!built[4..].contains('*'));
    }

    /// Property: a criterion value matches itself in the memory directory.
    #[test]
    fn prop_criterion_matches_literal(name in "[ -~]{1,24}") {
        let directory = MemoryDirectory::new();
        let mut user = User::empty();
        user.set("username", name.as_str()).unwrap();
        directory.insert(user.to_entry("uid=x,cn=users,dc=example,dc=com"));

        let found = Query::new()
            .directory(directory.handle("dc=example,dc=com"))
            .scope(UnitOfWork::new())
            .model::<User>()
            .unwrap()
            .filter_by([("username", name.as_str())])
            .first()
            .unwrap();
        prop_assert!(found.is_some());
    }

    /// Property: base derivation drops the host label and keeps the domain.
    #[test]
    fn prop_base_from_host(host in "[a-z]{1,10}", labels in prop::collection::vec("[a-z]{2,10}", 2..4)) {
        let server = format!("{host}.{}", labels.join("."));
        let expected: Vec<String> = labels.iter().map(|l| format!("dc={l}")).collect();
        prop_assert_eq!(base_dn_from_server(&server), Some(expected.join(",")));
    }
}
