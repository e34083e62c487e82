//! Directory models.
//!
//! Raw directory entries, the descriptor schema that maps them onto typed
//! models, and the built-in user and group models.

mod attribute;
mod computer_group;
mod entry;
mod group;
mod schema;
mod user;

pub use attribute::{AttributeDescriptor, AttributeValue};
pub use computer_group::ComputerGroup;
pub use entry::Entry;
pub use group::{Group, Membership};
pub use schema::{AttributeStore, Field, Model, ModelSchema, RawValues};
pub use user::User;
