//! Integration tests for opendir.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use opendir::directory::memory::MemoryDirectory;
use opendir::{
    AttributeDescriptor, AttributeStore, AttributeValue, Authorizer, Entry, Error, Field, Group,
    Model, ModelSchema, Query, Requirement, UnitOfWork, User,
};

const BASE: &str = "dc=example,dc=com";

fn seeded() -> MemoryDirectory {
    MemoryDirectory::with_entries([
        Entry::new("uid=alice,cn=users,dc=example,dc=com")
            .with("apple-generateduid", ["A-1"])
            .with("uid", ["alice"])
            .with("cn", ["Alice A"])
            .with("mail", ["alice@example.com", "a@example.com"]),
        Entry::new("uid=bob,cn=users,dc=example,dc=com")
            .with("apple-generateduid", ["B-2"])
            .with("uid", ["bob"])
            .with("cn", ["Bob B"]),
        Entry::new("cn=admins,cn=groups,dc=example,dc=com")
            .with("cn", ["admins"])
            .with("memberUid", ["bob"]),
        Entry::new("cn=staff,cn=groups,dc=example,dc=com")
            .with("cn", ["staff"])
            .with("memberUid", ["alice", "bob"])
            .with("apple-group-memberguid", ["C-3"]),
        Entry::new("cn=laser,cn=printers,dc=example,dc=com")
            .with("cn", ["laser"])
            .with("printer-uri", ["ipp://laser.example.com"]),
    ])
}

#[test]
fn test_error_types() {
    let err = Error::UnknownAttribute {
        model: "User".to_string(),
        name: "shoe_size".to_string(),
    };
    let display = err.to_string();
    assert!(display.contains("User"));
    assert!(display.contains("shoe_size"));

    let err = Error::connection("bind", "invalid credentials");
    let display = err.to_string();
    assert!(display.contains("bind"));
    assert!(display.contains("invalid credentials"));

    let err = Error::Unauthorized("user 'alice' lacks membership of 'admins'".to_string());
    assert!(err.to_string().contains("unauthorized"));
}

mod query_resolution {
    use super::*;

    #[test]
    fn test_user_query_end_to_end() {
        let directory = seeded();
        let scope = UnitOfWork::new();
        let users = Query::new()
            .directory(directory.handle(BASE))
            .scope(scope)
            .model::<User>()
            .unwrap()
            .all()
            .unwrap();

        assert_eq!(users.len(), 2);
        let search = directory.last_search().unwrap();
        assert_eq!(search.base, "cn=users,dc=example,dc=com");
        assert_eq!(search.filter, "(objectClass=*)");
        assert_eq!(
            search.attributes,
            Some(vec![
                "apple-generateduid".to_string(),
                "uid".to_string(),
                "mail".to_string(),
                "cn".to_string(),
            ])
        );
    }

    #[test]
    fn test_criteria_filters() {
        let directory = seeded();
        let scope = UnitOfWork::new();
        let query = Query::new()
            .directory(directory.handle(BASE))
            .scope(scope)
            .model::<User>()
            .unwrap();

        let alice = query.clone().filter_by([("username", "alice")]).first().unwrap().unwrap();
        assert_eq!(directory.last_search().unwrap().filter, "(uid=alice)");
        assert_eq!(alice.id(), Some("A-1"));
        assert_eq!(
            alice.email(),
            ["alice@example.com".to_string(), "a@example.com".to_string()]
        );

        let none = query
            .filter_by([("username", "alice"), ("full_name", "Alice B")])
            .first()
            .unwrap();
        assert_eq!(
            directory.last_search().unwrap().filter,
            "(&(uid=alice)(cn=Alice B))"
        );
        assert!(none.is_none());
    }

    #[test]
    fn test_explicit_location_wins() {
        let directory = seeded();
        let scope = UnitOfWork::new();
        let groups = Query::new()
            .directory(directory.handle(BASE))
            .scope(scope)
            .location(BASE)
            .model::<Group>()
            .unwrap()
            .filter("(memberUid=*)")
            .all()
            .unwrap();

        assert_eq!(directory.last_search().unwrap().base, BASE);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_reuse_changing_model_keeps_location() {
        let directory = seeded();
        let scope = UnitOfWork::new();
        let query = Query::new()
            .directory(directory.handle(BASE))
            .scope(scope)
            .location(BASE)
            .filter_by([("group_name", "staff")]);

        let staff = query.clone().model::<Group>().unwrap().first().unwrap().unwrap();
        assert_eq!(staff.users(), ["alice".to_string(), "bob".to_string()]);

        let raw = query.all_entries().unwrap();
        assert!(raw.is_empty());
        assert_eq!(directory.last_search().unwrap().filter, "(group_name=staff)");
        assert_eq!(directory.opened(), 1);
    }

    #[test]
    fn test_sentinel_record_dropped() {
        let directory = seeded();
        directory.set_sentinel(true);
        let scope = UnitOfWork::new();
        let query = Query::new()
            .directory(directory.handle(BASE))
            .scope(scope)
            .model::<User>()
            .unwrap()
            .filter_by([("username", "nobody")]);

        assert!(query.all().unwrap().is_empty());
        assert!(query.first().unwrap().is_none());
        assert_eq!(directory.searches().len(), 2);
    }

    #[test]
    fn test_without_scope_nothing_is_searched() {
        let directory = seeded();
        let users = Query::new()
            .directory(directory.handle(BASE))
            .model::<User>()
            .unwrap()
            .all()
            .unwrap();
        assert!(users.is_empty());
        assert!(directory.searches().is_empty());
    }

    #[test]
    fn test_connection_failure_propagates() {
        let directory = seeded();
        directory.set_unreachable(true);
        let scope = UnitOfWork::new();
        let err = Query::new()
            .directory(directory.handle(BASE))
            .scope(scope)
            .model::<User>()
            .unwrap()
            .all()
            .unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }
}

mod custom_model {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Printer(AttributeStore);

    impl Model for Printer {
        const SCHEMA: &'static ModelSchema = &ModelSchema::new(
            "Printer",
            &[
                Field::new("name", AttributeDescriptor::single("cn")),
                Field::new("uri", AttributeDescriptor::single("printer-uri")),
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

    #[test]
    fn test_declared_model_queries_its_location() {
        let directory = seeded();
        let scope = UnitOfWork::new();
        let printers = Query::new()
            .directory(directory.handle(BASE))
            .scope(scope)
            .model::<Printer>()
            .unwrap()
            .all()
            .unwrap();

        assert_eq!(directory.last_search().unwrap().base, "cn=printers,dc=example,dc=com");
        assert_eq!(printers.len(), 1);
        assert_eq!(
            printers[0].get("uri"),
            Some(AttributeValue::Single(Some("ipp://laser.example.com".to_string())))
        );
        assert_eq!(
            printers[0].render(),
            "Printer(name='laser', uri='ipp://laser.example.com')"
        );
    }

    #[test]
    fn test_set_by_external_key() {
        let mut printer = Printer::empty();
        printer.set("printer-uri", "ipp://x").unwrap();
        assert_eq!(printer.get("uri").unwrap().as_single(), Some("ipp://x"));
        assert!(printer.set("color", "yes").is_err());
        assert!(printer.get("color").is_none());
    }
}

mod authorization {
    use super::*;

    #[test]
    fn test_membership_predicates() {
        let directory = seeded();
        let scope = UnitOfWork::new();
        let authz: Authorizer = Authorizer::new(directory.handle(BASE));

        assert!(authz.is_in_group(&scope, "bob", "admins"));
        assert!(!authz.is_in_group(&scope, "alice", "admins"));
        assert!(!authz.is_in_group(&scope, "bob", "nonexistent"));

        assert!(authz.is_in_any_group(&scope, "alice", &["admins", "staff"]));
        assert!(!authz.is_in_all_groups(&scope, "alice", &["admins", "staff"]));
        assert!(authz.is_in_all_groups(&scope, "bob", &["admins", "staff"]));
        assert_eq!(directory.opened(), 1);
    }

    #[test]
    fn test_member_id_counts() {
        let directory = seeded();
        let scope = UnitOfWork::new();
        let authz: Authorizer = Authorizer::new(directory.handle(BASE));
        assert!(authz.is_in_group(&scope, "C-3", "staff"));
        assert!(!authz.is_in_group(&scope, "B-2", "admins"));
    }

    #[test]
    fn test_fails_closed_when_unreachable() {
        let directory = seeded();
        directory.set_unreachable(true);
        let scope = UnitOfWork::new().with_user("bob");
        let authz: Authorizer = Authorizer::new(directory.handle(BASE));

        assert!(!authz.is_in_group(&scope, "bob", "admins"));
        let result = authz.guard(&scope, &Requirement::group("admins"), || "secret");
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }

    #[test]
    fn test_guard_uses_scope_user() {
        let directory = seeded();
        let authz: Authorizer = Authorizer::new(directory.handle(BASE));

        let bob = UnitOfWork::new().with_user("bob");
        assert_eq!(
            authz.guard(&bob, &Requirement::all_of(["admins", "staff"]), || 7).unwrap(),
            7
        );

        let alice = UnitOfWork::new().with_user("alice");
        assert!(authz.guard(&alice, &Requirement::any_of(["admins"]), || 7).is_err());
        assert!(authz.guard(&alice, &Requirement::any_of(["admins", "staff"]), || 7).is_ok());
    }

    #[test]
    fn test_scope_closes_connections() {
        let directory = seeded();
        let authz: Authorizer = Authorizer::new(directory.handle(BASE));
        {
            let scope = UnitOfWork::new().with_user("bob");
            authz.authorize(&scope, &Requirement::group("admins")).unwrap();
            assert_eq!(directory.closed(), 0);
        }
        assert_eq!(directory.opened(), 1);
        assert_eq!(directory.closed(), 1);
    }
}
