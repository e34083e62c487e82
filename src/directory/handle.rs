//! Directory endpoint handle.

use super::ldap::LdapConnector;
use super::{Connector, DirectoryConnection, SharedConnection};
use crate::config::DirectoryConfig;
use crate::context::UnitOfWork;
use crate::Result;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Connection parameters for one directory endpoint.
///
/// Handles are cheap to clone and can be shared by any number of queries.
/// They never hold a live connection themselves: shared connections live in
/// a [`UnitOfWork`] and temporary ones are owned by the caller.
#[derive(Clone)]
pub struct DirectoryHandle {
    config: Arc<DirectoryConfig>,
    connector: Arc<dyn Connector>,
}

impl DirectoryHandle {
    /// Creates a handle that connects with `ldap3`.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        Self::with_connector(config, Arc::new(LdapConnector))
    }

    /// Creates a handle backed by a custom connector.
    #[must_use]
    pub fn with_connector(config: DirectoryConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    /// The endpoint configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// The configured server address.
    #[must_use]
    pub fn server_address(&self) -> &str {
        &self.config.server
    }

    /// The base location searches are rooted under.
    ///
    /// An explicit `base_dn` wins; otherwise the location is derived from
    /// the server address, and is empty when that is not possible.
    #[must_use]
    pub fn base_location(&self) -> String {
        self.config
            .base_dn
            .clone()
            .or_else(|| base_dn_from_server(&self.config.server))
            .unwrap_or_default()
    }

    /// Opens a new connection owned by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the connection or bind fails.
    pub fn open_connection(&self) -> Result<Box<dyn DirectoryConnection>> {
        debug!(url = %self.config.url(), "Opening directory connection");
        self.connector.connect(&self.config)
    }

    /// Returns the connection shared within `scope`, opening it on first use.
    ///
    /// Without a scope there is nothing to share and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the connection has to be
    /// opened and that fails.
    pub fn shared_connection(&self, scope: Option<&UnitOfWork>) -> Result<Option<SharedConnection>> {
        let Some(scope) = scope else {
            return Ok(None);
        };
        scope
            .connection(&self.endpoint_key(), || self.open_connection())
            .map(Some)
    }

    /// Runs `f` with a connection.
    ///
    /// Uses the scope's shared connection when there is one. Otherwise a
    /// temporary connection is opened and closed once `f` returns, whether
    /// or not it succeeded. Shared connections are never closed here.
    ///
    /// # Errors
    ///
    /// Returns the error from opening the connection or from `f`. A failure
    /// to close the temporary connection is reported only if `f` succeeded.
    pub fn with_connection<T>(
        &self,
        scope: Option<&UnitOfWork>,
        f: impl FnOnce(&SharedConnection) -> Result<T>,
    ) -> Result<T> {
        if let Some(shared) = self.shared_connection(scope)? {
            return f(&shared);
        }

        let temporary = SharedConnection::new(self.open_connection()?);
        let result = f(&temporary);
        match (result, temporary.close()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), close) => {
                if let Err(close_err) = close {
                    warn!(error = %close_err, "Failed to close temporary connection");
                }
                Err(e)
            },
        }
    }

    /// Key identifying this endpoint within a unit of work.
    fn endpoint_key(&self) -> String {
        format!(
            "{}|{}",
            self.config.url(),
            self.config.bind_dn.as_deref().unwrap_or_default()
        )
    }
}

impl fmt::Debug for DirectoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryHandle")
            .field("server", &self.config.server)
            .field("base_dn", &self.config.base_dn)
            .finish_non_exhaustive()
    }
}

/// Derives a base location from a server address.
///
/// Scheme, credentials, port and path are ignored. IP addresses and
/// single-label hosts have no derivable base. For three or more labels the
/// host's own label is dropped: `od.example.com` → `dc=example,dc=com`.
#[must_use]
pub fn base_dn_from_server(server: &str) -> Option<String> {
    let without_scheme = server.split_once("://").map_or(server, |(_, rest)| rest);
    let authority = without_scheme.split('/').next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);

    if host_port.starts_with('[') || host_port.parse::<IpAddr>().is_ok() {
        return None;
    }
    let host = host_port.split(':').next().unwrap_or_default();
    if host.parse::<IpAddr>().is_ok() {
        return None;
    }

    let labels: Vec<&str> = host
        .trim_end_matches('.')
        .split('.')
        .filter(|label| !label.is_empty())
        .collect();
    let domain = match labels.len() {
        0 | 1 => return None,
        2 => &labels[..],
        _ => &labels[1..],
    };

    Some(
        domain
            .iter()
            .map(|label| format!("dc={label}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}
