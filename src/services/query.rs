//! Query builder.
//!
//! A [`Query`] collects optional search parameters and resolves the missing
//! ones at execution time:
//!
//! | Parameter | Resolution order |
//! |-----------|------------------|
//! | location | explicit → model location under the handle's base → handle's base |
//! | filter | explicit → criteria through the model's key map → `(objectClass=*)` |
//! | fields | explicit → model's external keys → everything |
//! | connection | explicit → handle's connection shared in the unit of work → none |
//!
//! Without a resolvable connection a search yields no entries rather than
//! an error. Nothing is resolved before execution, so a query can be
//! reconfigured freely, including rebinding it to another model.
//!
//! ```rust,ignore
//! let admins = Query::new()
//!     .directory(handle)
//!     .scope(scope)
//!     .model::<Group>()?
//!     .filter_by([("group_name", "admins")])
//!     .first()?;
//! ```

use super::filter::{self, MATCH_ALL};
use crate::context::UnitOfWork;
use crate::directory::{DirectoryHandle, SharedConnection};
use crate::models::{Entry, Model, ModelSchema, RawValues};
use crate::Result;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

/// Marker for a query with no model bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// What a query is bound to: a [`Model`] or [`Unbound`].
pub trait Binding {
    /// Schema of the bound model, if any.
    fn schema() -> Option<&'static ModelSchema>;
}

impl Binding for Unbound {
    fn schema() -> Option<&'static ModelSchema> {
        None
    }
}

impl<M: Model> Binding for M {
    fn schema() -> Option<&'static ModelSchema> {
        Some(M::SCHEMA)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterSource {
    Raw(String),
    Criteria(Vec<(String, String)>),
}

/// Lazily resolved directory search, optionally bound to model `M`.
pub struct Query<M = Unbound> {
    directory: Option<DirectoryHandle>,
    scope: Option<UnitOfWork>,
    location: Option<String>,
    filter: Option<FilterSource>,
    fields: Option<Vec<String>>,
    connection: Option<SharedConnection>,
    binding: PhantomData<fn() -> M>,
}

impl Query<Unbound> {
    /// Creates a query with nothing configured.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            directory: None,
            scope: None,
            location: None,
            filter: None,
            fields: None,
            connection: None,
            binding: PhantomData,
        }
    }
}

impl Default for Query<Unbound> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Binding> Query<M> {
    /// Sets the directory the query inherits defaults and connections from.
    #[must_use]
    pub fn directory(mut self, directory: DirectoryHandle) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Sets the unit of work whose shared connection is used.
    #[must_use]
    pub fn scope(mut self, scope: UnitOfWork) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Sets an explicit search location.
    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets a raw filter string, used as is.
    ///
    /// Replaces any criteria set with [`Query::filter_by`].
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(FilterSource::Raw(filter.into()));
        self
    }

    /// Sets `field = value` criteria, AND-combined in the order given.
    ///
    /// Field names go through the bound model's key map at execution time.
    /// Values are escaped and match literally, so `*` is not a wildcard here;
    /// use [`Query::filter`] for substring or presence matches.
    /// Replaces any raw filter set with [`Query::filter`].
    #[must_use]
    pub fn filter_by<I, K, V>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let criteria = criteria
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.filter = Some(FilterSource::Criteria(criteria));
        self
    }

    /// Sets an explicit connection.
    #[must_use]
    pub fn connection(mut self, connection: impl Into<SharedConnection>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// Sets the requested fields: a single key or a list of keys.
    #[must_use]
    pub fn fields(mut self, fields: impl Into<RawValues>) -> Self {
        self.fields = Some(fields.into().into_inner());
        self
    }

    /// Binds the query to model `N`, keeping everything else.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if `N`'s schema is invalid.
    pub fn model<N: Model>(self) -> Result<Query<N>> {
        N::SCHEMA.validate()?;
        Ok(Query {
            directory: self.directory,
            scope: self.scope,
            location: self.location,
            filter: self.filter,
            fields: self.fields,
            connection: self.connection,
            binding: PhantomData,
        })
    }

    /// The bound model's schema, if any.
    #[must_use]
    pub fn schema(&self) -> Option<&'static ModelSchema> {
        M::schema()
    }

    /// Location the search will be rooted at.
    #[must_use]
    pub fn effective_location(&self) -> Option<String> {
        if let Some(location) = &self.location {
            return Some(location.clone());
        }
        let base = self.directory.as_ref()?.base_location();
        Some(M::schema().map_or_else(
            || base.clone(),
            |schema| combine_location(&schema.query_location(), &base),
        ))
    }

    /// Filter the search will use.
    #[must_use]
    pub fn effective_filter(&self) -> String {
        match &self.filter {
            Some(FilterSource::Raw(raw)) => raw.clone(),
            Some(FilterSource::Criteria(criteria)) => {
                filter::from_criteria(criteria, M::schema()).unwrap_or_else(|| MATCH_ALL.to_string())
            },
            None => MATCH_ALL.to_string(),
        }
    }

    /// Keys the search will request; `None` requests everything.
    #[must_use]
    pub fn effective_fields(&self) -> Option<Vec<String>> {
        self.fields.clone().or_else(|| {
            M::schema().map(|schema| {
                schema
                    .external_keys()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
        })
    }

    /// Connection the search will use, opening the shared one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the shared connection has
    /// to be opened and that fails.
    pub fn effective_connection(&self) -> Result<Option<SharedConnection>> {
        if let Some(connection) = &self.connection {
            return Ok(Some(connection.clone()));
        }
        match &self.directory {
            Some(directory) => directory.shared_connection(self.scope.as_ref()),
            None => Ok(None),
        }
    }

    /// Runs the search on the effective connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the directory fails.
    pub fn execute(&self) -> Result<SearchResults> {
        match self.effective_connection()? {
            Some(connection) => self.execute_on(&connection),
            None => {
                debug!("No connection resolvable, returning no entries");
                Ok(SearchResults::default())
            },
        }
    }

    /// Runs the search on `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the directory fails.
    pub fn execute_on(&self, connection: &SharedConnection) -> Result<SearchResults> {
        let location = self.effective_location().unwrap_or_default();
        let filter = self.effective_filter();
        let fields = self.effective_fields();

        let _entered = self.scope.as_ref().map(|scope| scope.span().entered());
        debug!(
            location = %location,
            filter = %filter,
            fields = ?fields,
            model = M::schema().map(ModelSchema::name),
            "Executing directory query"
        );
        let entries = connection.search(&location, &filter, fields.as_deref())?;
        Ok(SearchResults { entries })
    }

    /// First matching raw entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the directory fails.
    pub fn first_entry(&self) -> Result<Option<Entry>> {
        Ok(self.execute()?.into_first())
    }

    /// First matching raw entry, searched on `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the directory fails.
    pub fn first_entry_on(&self, connection: &SharedConnection) -> Result<Option<Entry>> {
        Ok(self.execute_on(connection)?.into_first())
    }

    /// Every matching raw entry, in directory order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the directory fails.
    pub fn all_entries(&self) -> Result<Vec<Entry>> {
        Ok(self.execute()?.into_iter().collect())
    }

    /// Every matching raw entry, searched on `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the directory fails.
    pub fn all_entries_on(&self, connection: &SharedConnection) -> Result<Vec<Entry>> {
        Ok(self.execute_on(connection)?.into_iter().collect())
    }
}

impl<M: Model> Query<M> {
    /// First match converted to `M`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the directory fails.
    pub fn first(&self) -> Result<Option<M>> {
        Ok(self.first_entry()?.as_ref().map(M::from_entry))
    }

    /// First match converted to `M`, searched on `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the directory fails.
    pub fn first_on(&self, connection: &SharedConnection) -> Result<Option<M>> {
        Ok(self.first_entry_on(connection)?.as_ref().map(M::from_entry))
    }

    /// Every match converted to `M`, in directory order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the directory fails.
    pub fn all(&self) -> Result<Vec<M>> {
        Ok(self.execute()?.into_iter().map(|e| M::from_entry(&e)).collect())
    }

    /// Every match converted to `M`, searched on `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the directory fails.
    pub fn all_on(&self, connection: &SharedConnection) -> Result<Vec<M>> {
        Ok(self
            .execute_on(connection)?
            .into_iter()
            .map(|e| M::from_entry(&e))
            .collect())
    }
}

impl<M> Clone for Query<M> {
    fn clone(&self) -> Self {
        Self {
            directory: self.directory.clone(),
            scope: self.scope.clone(),
            location: self.location.clone(),
            filter: self.filter.clone(),
            fields: self.fields.clone(),
            connection: self.connection.clone(),
            binding: PhantomData,
        }
    }
}

impl<M: Binding> fmt::Debug for Query<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("model", &M::schema().map(ModelSchema::name))
            .field("directory", &self.directory)
            .field("location", &self.location)
            .field("filter", &self.filter)
            .field("fields", &self.fields)
            .field("connection", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

/// Places a model location fragment under `base`.
///
/// A fragment without `cn=` is taken as a bare name (`users` → `cn=users`).
fn combine_location(fragment: &str, base: &str) -> String {
    let fragment = if fragment.to_ascii_lowercase().contains("cn=") {
        fragment.to_string()
    } else {
        format!("cn={fragment}")
    };
    if base.is_empty() {
        fragment
    } else {
        format!("{fragment},{base}")
    }
}

/// Entries returned by one search, already fetched.
///
/// Iterating skips entries without any value: some directories answer an
/// empty search with such a pseudo-record instead of nothing.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    entries: Vec<Entry>,
}

impl SearchResults {
    /// Everything the directory returned, pseudo-records included.
    #[must_use]
    pub fn raw(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries with content.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if no entry has content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Entries with content, in directory order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|entry| entry.has_content())
    }

    /// The first entry with content.
    #[must_use]
    pub fn into_first(self) -> Option<Entry> {
        self.entries.into_iter().find(Entry::has_content)
    }
}

impl IntoIterator for SearchResults {
    type Item = Entry;
    type IntoIter = std::iter::Filter<std::vec::IntoIter<Entry>, fn(&Entry) -> bool>;

    fn into_iter(self) -> Self::IntoIter {
        let keep: fn(&Entry) -> bool = Entry::has_content;
        self.entries.into_iter().filter(keep)
    }
}
