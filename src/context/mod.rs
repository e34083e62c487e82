//! Units of work.
//!
//! A [`UnitOfWork`] is the explicit scope one logical request runs in. It
//! carries the caller's identity and owns the connections shared by every
//! query issued within it: the first query against an endpoint opens a
//! connection, later ones reuse it, and the connections are closed when
//! the last clone of the unit of work is dropped (or on [`UnitOfWork::finish`]).
//!
//! Units of work are passed explicitly to queries and authorization checks.
//! They are not meant to be shared between concurrently running requests.

use crate::directory::{DirectoryConnection, SharedConnection};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-request scope with an id, an optional user and shared connections.
#[derive(Clone)]
pub struct UnitOfWork {
    id: String,
    user: Option<String>,
    connections: Arc<ConnectionSlots>,
}

impl UnitOfWork {
    /// Creates a unit of work with a generated id.
    #[must_use]
    pub fn new() -> Self {
        Self::from_id(Uuid::new_v4().to_string())
    }

    /// Creates a unit of work with an existing id.
    #[must_use]
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user: None,
            connections: Arc::new(ConnectionSlots::default()),
        }
    }

    /// Sets the user the work is performed for.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Returns the id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the current user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// A span carrying the id and user, for instrumenting the work.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "unit_of_work",
            id = %self.id,
            user = self.user.as_deref().unwrap_or("-")
        )
    }

    /// Returns the connection stored under `key`, opening it with `open`
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns the error from `open`, or [`Error::Connection`] if the
    /// connection table is poisoned.
    pub fn connection(
        &self,
        key: &str,
        open: impl FnOnce() -> Result<Box<dyn DirectoryConnection>>,
    ) -> Result<SharedConnection> {
        let mut slots = self
            .connections
            .slots
            .lock()
            .map_err(|e| Error::connection("connect", e))?;
        if let Some(existing) = slots.get(key) {
            return Ok(existing.clone());
        }

        let shared = SharedConnection::new(open()?);
        debug!(unit_of_work = %self.id, endpoint = key, "Opened shared connection");
        slots.insert(key.to_string(), shared.clone());
        Ok(shared)
    }

    /// Number of connections currently held.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections
            .slots
            .lock()
            .map_or(0, |slots| slots.len())
    }

    /// Closes every held connection now.
    ///
    /// All connections are closed even if some fail.
    ///
    /// # Errors
    ///
    /// Returns the first close error.
    pub fn finish(self) -> Result<()> {
        let drained = self.connections.drain();
        let mut first_error = None;
        for (key, connection) in drained {
            if let Err(e) = connection.close() {
                warn!(unit_of_work = %self.id, endpoint = %key, error = %e, "Failed to close connection");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for UnitOfWork {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("connections", &self.connection_count())
            .finish()
    }
}

/// Connections shared by all clones of one unit of work.
#[derive(Default)]
struct ConnectionSlots {
    slots: Mutex<HashMap<String, SharedConnection>>,
}

impl ConnectionSlots {
    fn drain(&self) -> Vec<(String, SharedConnection)> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect()
    }
}

impl Drop for ConnectionSlots {
    fn drop(&mut self) {
        for (key, connection) in self.drain() {
            match connection.close() {
                Ok(()) => debug!(endpoint = %key, "Closed shared connection"),
                Err(e) => warn!(endpoint = %key, error = %e, "Failed to close shared connection"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Connector;
    use crate::directory::memory::MemoryDirectory;
    use crate::DirectoryConfig;

    fn opener(directory: &MemoryDirectory) -> impl FnOnce() -> Result<Box<dyn DirectoryConnection>> + '_ {
        || directory.connect(&DirectoryConfig::default())
    }

    #[test]
    fn test_identity() {
        let work = UnitOfWork::from_id("req-1").with_user("alice");
        assert_eq!(work.id(), "req-1");
        assert_eq!(work.user(), Some("alice"));
        assert!(UnitOfWork::new().user().is_none());
        assert_ne!(UnitOfWork::new().id(), UnitOfWork::new().id());
    }

    #[test]
    fn test_connection_opened_once_per_key() {
        let directory = MemoryDirectory::new();
        let work = UnitOfWork::new();

        let a = work.connection("one", opener(&directory)).unwrap();
        let b = work.connection("one", opener(&directory)).unwrap();
        let c = work.connection("two", opener(&directory)).unwrap();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(work.connection_count(), 2);
        assert_eq!(directory.opened(), 2);
    }

    #[test]
    fn test_clones_share_connections_and_close_on_last_drop() {
        let directory = MemoryDirectory::new();
        let work = UnitOfWork::new();
        let clone = work.clone().with_user("bob");

        let a = work.connection("one", opener(&directory)).unwrap();
        let b = clone.connection("one", opener(&directory)).unwrap();
        assert!(a.ptr_eq(&b));

        drop(work);
        assert_eq!(directory.closed(), 0);
        drop(clone);
        assert_eq!(directory.closed(), 1);
    }

    #[test]
    fn test_finish_closes_connections() {
        let directory = MemoryDirectory::new();
        let work = UnitOfWork::new();
        work.connection("one", opener(&directory)).unwrap();

        work.finish().unwrap();
        assert_eq!(directory.closed(), 1);
    }

    #[test]
    fn test_open_failure_not_cached() {
        let directory = MemoryDirectory::new();
        directory.set_unreachable(true);
        let work = UnitOfWork::new();
        assert!(work.connection("one", opener(&directory)).is_err());
        assert_eq!(work.connection_count(), 0);

        directory.set_unreachable(false);
        assert!(work.connection("one", opener(&directory)).is_ok());
    }
}
