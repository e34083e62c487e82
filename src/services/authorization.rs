//! Group-based authorization.
//!
//! Checks whether the user of a [`UnitOfWork`] belongs to one, any, or all
//! of a set of groups, and guards operations behind such a requirement.
//!
//! # Failing closed
//!
//! The boolean predicates never return an error. When the directory cannot
//! be reached or a search fails, the failure is logged and the check
//! answers `false`. A denied [`Authorizer::authorize`] call surfaces as
//! [`Error::Unauthorized`] so the host can map it to its own access-denied
//! response.
//!
//! # Usage
//!
//! ```rust,ignore
//! let authorizer = Authorizer::<Group>::new(handle);
//! let scope = UnitOfWork::new().with_user("bob");
//!
//! let report = authorizer.guard(&scope, &Requirement::group("admins"), || build_report())?;
//! ```

use super::query::Query;
use crate::context::UnitOfWork;
use crate::directory::DirectoryHandle;
use crate::models::{Group, Membership};
use crate::{Error, Result};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, error, warn};

/// Group membership a caller must have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Member of this group.
    Group(String),
    /// Member of at least one of these groups.
    AnyGroup(Vec<String>),
    /// Member of every one of these groups.
    AllGroups(Vec<String>),
}

impl Requirement {
    /// Membership of one group.
    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Self::Group(name.into())
    }

    /// Membership of at least one group.
    #[must_use]
    pub fn any_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyGroup(names.into_iter().map(Into::into).collect())
    }

    /// Membership of every group.
    #[must_use]
    pub fn all_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllGroups(names.into_iter().map(Into::into).collect())
    }

    /// Metric label for this kind of requirement.
    const fn kind(&self) -> &'static str {
        match self {
            Self::Group(_) => "one",
            Self::AnyGroup(_) => "any",
            Self::AllGroups(_) => "all",
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(name) => write!(f, "membership of '{name}'"),
            Self::AnyGroup(names) => write!(f, "membership of any of [{}]", names.join(", ")),
            Self::AllGroups(names) => write!(f, "membership of all of [{}]", names.join(", ")),
        }
    }
}

/// Answers group-membership questions against a directory.
///
/// `G` is the group model; it defaults to [`Group`].
pub struct Authorizer<G: Membership = Group> {
    directory: DirectoryHandle,
    group: PhantomData<fn() -> G>,
}

impl<G: Membership> Authorizer<G> {
    /// Creates an authorizer for `directory`.
    #[must_use]
    pub const fn new(directory: DirectoryHandle) -> Self {
        Self {
            directory,
            group: PhantomData,
        }
    }

    /// The directory groups are looked up in.
    #[must_use]
    pub const fn directory(&self) -> &DirectoryHandle {
        &self.directory
    }

    /// Looks up `group_name` and checks `username` against its members.
    ///
    /// A group that does not exist has no members.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the directory fails.
    pub fn check_group(&self, scope: &UnitOfWork, username: &str, group_name: &str) -> Result<bool> {
        let group = Query::new()
            .directory(self.directory.clone())
            .scope(scope.clone())
            .model::<G>()?
            .filter_by([(G::NAME_FIELD, group_name)])
            .first()?;

        let Some(group) = group else {
            debug!(group = group_name, "Group not found");
            return Ok(false);
        };
        Ok(group.has_member(username))
    }

    /// Returns `true` if `username` is a member of `group_name`.
    ///
    /// Directory failures are logged and answer `false`.
    pub fn is_in_group(&self, scope: &UnitOfWork, username: &str, group_name: &str) -> bool {
        match self.check_group(scope, username, group_name) {
            Ok(member) => member,
            Err(e) => {
                error!(
                    unit_of_work = scope.id(),
                    user = username,
                    group = group_name,
                    error = %e,
                    "Membership check failed, denying"
                );
                false
            },
        }
    }

    /// Returns `true` if `username` is in at least one of `group_names`.
    ///
    /// Stops at the first match. No groups means no match.
    pub fn is_in_any_group<S: AsRef<str>>(
        &self,
        scope: &UnitOfWork,
        username: &str,
        group_names: &[S],
    ) -> bool {
        group_names
            .iter()
            .any(|name| self.is_in_group(scope, username, name.as_ref()))
    }

    /// Returns `true` if `username` is in every one of `group_names`.
    ///
    /// Stops at the first miss. No groups means no match.
    pub fn is_in_all_groups<S: AsRef<str>>(
        &self,
        scope: &UnitOfWork,
        username: &str,
        group_names: &[S],
    ) -> bool {
        !group_names.is_empty()
            && group_names
                .iter()
                .all(|name| self.is_in_group(scope, username, name.as_ref()))
    }

    /// Returns `true` if `username` satisfies `requirement`.
    pub fn satisfies(&self, scope: &UnitOfWork, username: &str, requirement: &Requirement) -> bool {
        match requirement {
            Requirement::Group(name) => self.is_in_group(scope, username, name),
            Requirement::AnyGroup(names) => self.is_in_any_group(scope, username, names.as_slice()),
            Requirement::AllGroups(names) => {
                self.is_in_all_groups(scope, username, names.as_slice())
            },
        }
    }

    /// Checks the user of `scope` against `requirement`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if the scope has no user or the user
    /// does not satisfy the requirement.
    pub fn authorize(&self, scope: &UnitOfWork, requirement: &Requirement) -> Result<()> {
        let _entered = scope.span().entered();
        let Some(user) = scope.user() else {
            record(requirement, "anonymous");
            warn!(requirement = %requirement, "Denied: no user");
            return Err(Error::Unauthorized(format!("{requirement} requires a user")));
        };

        if self.satisfies(scope, user, requirement) {
            record(requirement, "granted");
            debug!(user, requirement = %requirement, "Granted");
            Ok(())
        } else {
            record(requirement, "denied");
            warn!(user, requirement = %requirement, "Denied");
            Err(Error::Unauthorized(format!("user '{user}' lacks {requirement}")))
        }
    }

    /// Runs `op` only if the user of `scope` satisfies `requirement`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] without running `op` on denial.
    pub fn guard<T>(
        &self,
        scope: &UnitOfWork,
        requirement: &Requirement,
        op: impl FnOnce() -> T,
    ) -> Result<T> {
        self.authorize(scope, requirement)?;
        Ok(op())
    }

    /// Runs `op` only if `predicate` accepts the user of `scope`.
    ///
    /// For checks that are not group membership, such as allowing a single
    /// username.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] without running `op` when the scope
    /// has no user or `predicate` rejects it.
    pub fn guard_with<T>(
        &self,
        scope: &UnitOfWork,
        predicate: impl FnOnce(&str) -> bool,
        op: impl FnOnce() -> T,
    ) -> Result<T> {
        let user = scope.user();
        if user.is_some_and(predicate) {
            debug!(user, "Custom guard granted");
            metrics::counter!("opendir_authz_total", "outcome" => "granted", "requirement" => "custom")
                .increment(1);
            Ok(op())
        } else {
            warn!(user, "Custom guard denied");
            metrics::counter!("opendir_authz_total", "outcome" => "denied", "requirement" => "custom")
                .increment(1);
            Err(Error::Unauthorized("rejected by custom guard".to_string()))
        }
    }
}

impl<G: Membership> Clone for Authorizer<G> {
    fn clone(&self) -> Self {
        Self::new(self.directory.clone())
    }
}

impl<G: Membership> fmt::Debug for Authorizer<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("group_model", &G::SCHEMA.name())
            .field("directory", &self.directory)
            .finish()
    }
}

fn record(requirement: &Requirement, outcome: &'static str) {
    metrics::counter!(
        "opendir_authz_total",
        "outcome" => outcome,
        "requirement" => requirement.kind()
    )
    .increment(1);
}
