//! # opendir
//!
//! Directory-service query and authorization layer.
//!
//! opendir maps raw directory entries (LDAP-style records) onto typed models,
//! builds searches lazily from partial configuration, and answers group
//! membership questions for a request-handling layer.
//!
//! ## Features
//!
//! - Descriptor-driven models: field name ↔ external key, single or multiple values
//! - Fluent query builder with layered fallbacks for location, filter, fields and connection
//! - One shared connection per unit of work, or temporary connections outside of one
//! - Group authorization predicates (one, any, all) and guards for protected operations
//! - Optional axum middleware (`http` feature) that protects routes with a requirement
//!
//! ## Example
//!
//! ```rust,ignore
//! use opendir::{DirectoryConfig, DirectoryHandle, Query, UnitOfWork, User};
//!
//! let directory = DirectoryHandle::new(DirectoryConfig::default().with_server("od.example.com"));
//! let scope = UnitOfWork::new();
//! let user = Query::new()
//!     .directory(directory)
//!     .scope(scope)
//!     .model::<User>()?
//!     .filter_by([("username", "alice")])
//!     .first()?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod context;
pub mod directory;
#[cfg(feature = "http")]
pub mod http;
pub mod models;
pub mod observability;
pub mod services;

pub use config::DirectoryConfig;
pub use context::UnitOfWork;
pub use directory::{Connector, DirectoryConnection, DirectoryHandle, SharedConnection};
pub use models::{
    AttributeDescriptor, AttributeStore, AttributeValue, ComputerGroup, Entry, Field, Group,
    Membership, Model, ModelSchema, User,
};
pub use services::{Authorizer, Query, Requirement, SearchResults, Unbound};

/// Error type for opendir operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Configuration` | Invalid model schema, invalid config values |
/// | `UnknownAttribute` | Writing or strictly reading a field a model does not declare |
/// | `Connection` | Connecting, binding, searching or closing a directory connection fails |
/// | `Unauthorized` | A protected operation is denied for the current user |
/// | `OperationFailed` | Config file I/O or parsing fails, logging init fails |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid configuration.
    ///
    /// Raised when:
    /// - A model schema declares a field name or external key twice
    /// - A configuration value cannot be interpreted
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A name that is neither a field nor an external key of a model.
    #[error("model '{model}' has no attribute '{name}'")]
    UnknownAttribute {
        /// The model name.
        model: String,
        /// The requested attribute name.
        name: String,
    },

    /// The directory could not be reached or a directory call failed.
    ///
    /// Propagated unmodified from the connection layer. No retries are made.
    #[error("directory '{operation}' failed: {cause}")]
    Connection {
        /// The directory operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Access denied.
    ///
    /// Raised when:
    /// - A requirement is checked in a unit of work without a user
    /// - The user is not a member of the required group(s)
    /// - The membership check could not be completed (fail closed)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A non-directory operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds a [`Error::Connection`] from any displayable cause.
    pub fn connection(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::Connection {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for opendir operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Configuration("duplicate field 'id'".to_string());
        assert_eq!(err.to_string(), "configuration error: duplicate field 'id'");

        let err = Error::UnknownAttribute {
            model: "User".to_string(),
            name: "shoe_size".to_string(),
        };
        assert_eq!(err.to_string(), "model 'User' has no attribute 'shoe_size'");

        let err = Error::connection("search", "connection reset");
        assert_eq!(err.to_string(), "directory 'search' failed: connection reset");
    }
}
