//! `ldap3` transport.
//!
//! Uses the blocking [`ldap3::LdapConn`]. Every search is a subtree search;
//! when no attribute list is given all user attributes (`*`) are requested.

use super::{Connector, DirectoryConnection};
use crate::config::DirectoryConfig;
use crate::models::Entry;
use crate::{Error, Result};
use ldap3::{LdapConn, LdapConnSettings, Scope, SearchEntry};
use secrecy::ExposeSecret;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Opens [`LdapConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

impl Connector for LdapConnector {
    fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn DirectoryConnection>> {
        let url = config.url();
        let mut settings = LdapConnSettings::new();
        if let Some(timeout) = config.connect_timeout {
            settings = settings.set_conn_timeout(timeout);
        }

        let mut conn = LdapConn::with_settings(settings, &url)
            .map_err(|e| Error::connection("connect", e))?;

        if let Some(bind_dn) = config.bind_dn.as_deref() {
            let password = config
                .bind_password
                .as_ref()
                .map(|p| p.expose_secret().to_string())
                .unwrap_or_default();
            conn.simple_bind(bind_dn, &password)
                .and_then(ldap3::LdapResult::success)
                .map_err(|e| Error::connection("bind", e))?;
            debug!(bind_dn, "Bound to directory");
        }

        info!(url = %url, "Connected to directory");
        Ok(Box::new(LdapConnection {
            conn,
            url,
            closed: false,
        }))
    }
}

/// A live `ldap3` connection.
pub struct LdapConnection {
    conn: LdapConn,
    url: String,
    closed: bool,
}

impl DirectoryConnection for LdapConnection {
    fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: Option<&[String]>,
    ) -> Result<Vec<Entry>> {
        if self.closed {
            return Err(Error::connection("search", "connection already closed"));
        }

        let requested: Vec<&str> = attributes.map_or_else(
            || vec!["*"],
            |keys| keys.iter().map(String::as_str).collect(),
        );

        debug!(base, filter, attributes = ?requested, "Searching directory");
        let (results, _) = self
            .conn
            .search(base, Scope::Subtree, filter, requested)
            .and_then(|response| response.success())
            .map_err(|e| Error::connection("search", e))?;

        let entries: Vec<Entry> = results
            .into_iter()
            .map(|result| {
                let entry = SearchEntry::construct(result);
                Entry {
                    dn: entry.dn,
                    attributes: entry.attrs.into_iter().collect::<BTreeMap<_, _>>(),
                }
            })
            .collect();
        debug!(count = entries.len(), "Search complete");
        Ok(entries)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.conn.unbind().map_err(|e| {
            warn!(url = %self.url, error = %e, "Unbind failed");
            Error::connection("close", e)
        })?;
        debug!(url = %self.url, "Closed directory connection");
        Ok(())
    }
}
