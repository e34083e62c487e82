//! Query and authorization services.
//!
//! [`Query`] resolves and runs directory searches; [`Authorizer`] builds
//! group-membership checks on top of it.

mod authorization;
pub mod filter;
mod query;

pub use authorization::{Authorizer, Requirement};
pub use query::{Binding, Query, SearchResults, Unbound};
