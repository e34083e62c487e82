//! Directory transport seams.
//!
//! The query engine never speaks the directory protocol itself. It talks to
//! a [`DirectoryConnection`] obtained from a [`Connector`]:
//!
//! - [`ldap::LdapConnector`]: `ldap3`-backed transport for real servers
//! - [`memory::MemoryDirectory`]: in-process directory for tests and local use
//!
//! Connections that outlive a single call are wrapped in a
//! [`SharedConnection`], which is how a unit of work reuses one connection
//! across many queries.

mod handle;
pub mod ldap;
pub mod memory;

pub use handle::{DirectoryHandle, base_dn_from_server};

use crate::config::DirectoryConfig;
use crate::models::Entry;
use crate::{Error, Result};
use std::fmt;
use std::sync::{Arc, Mutex};

/// A live connection to a directory.
///
/// Calls block on network I/O. No timeout is imposed here; transports
/// enforce their own.
pub trait DirectoryConnection: Send {
    /// Searches the subtree rooted at `base` for entries matching `filter`.
    ///
    /// `attributes` restricts the returned keys; `None` returns every key
    /// the directory provides. Entries come back in directory order.
    fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: Option<&[String]>,
    ) -> Result<Vec<Entry>>;

    /// Releases the connection.
    fn close(&mut self) -> Result<()>;
}

/// Opens connections for a directory endpoint.
pub trait Connector: Send + Sync {
    /// Opens and binds a new connection.
    fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn DirectoryConnection>>;
}

/// A connection shared by several callers within one unit of work.
///
/// Cloning is cheap; all clones use the same underlying connection. The
/// connection is not meant for concurrent use from several units of work.
#[derive(Clone)]
pub struct SharedConnection {
    inner: Arc<Mutex<Box<dyn DirectoryConnection>>>,
}

impl SharedConnection {
    /// Wraps a connection.
    #[must_use]
    pub fn new(connection: Box<dyn DirectoryConnection>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(connection)),
        }
    }

    /// Runs a search on the underlying connection.
    pub fn search(
        &self,
        base: &str,
        filter: &str,
        attributes: Option<&[String]>,
    ) -> Result<Vec<Entry>> {
        let mut connection = self
            .inner
            .lock()
            .map_err(|e| Error::connection("search", e))?;
        connection.search(base, filter, attributes)
    }

    /// Closes the underlying connection.
    pub fn close(&self) -> Result<()> {
        let mut connection = self
            .inner
            .lock()
            .map_err(|e| Error::connection("close", e))?;
        connection.close()
    }

    /// Returns `true` if both handles share one connection.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<Box<dyn DirectoryConnection>> for SharedConnection {
    fn from(connection: Box<dyn DirectoryConnection>) -> Self {
        Self::new(connection)
    }
}

impl fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedConnection")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}
