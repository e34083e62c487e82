//! In-process directory.
//!
//! [`MemoryDirectory`] holds entries in memory and evaluates search filters
//! itself. It records every search it receives and counts opened and closed
//! connections, which makes it the backend of choice for tests and for
//! local development without a directory server.
//!
//! Supported filter syntax:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `(&(a)(b))`, `(\|(a)(b))`, `(!(a))` | and, or, not |
//! | `(key=value)` | case-insensitive equality |
//! | `(key=*)` | presence |
//! | `(key=pre*mid*suf)` | substring |
//!
//! Values may use `\XX` hex escapes. `objectClass` presence matches every
//! entry, mirroring real directories where every entry has a class.

use super::{Connector, DirectoryConnection, DirectoryHandle};
use crate::config::DirectoryConfig;
use crate::models::Entry;
use crate::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Server address reported by memory-backed handles.
pub const MEMORY_SERVER: &str = "memory";

/// A search received by a [`MemoryDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRecord {
    /// Search base.
    pub base: String,
    /// Filter string as received.
    pub filter: String,
    /// Requested attributes; `None` means all.
    pub attributes: Option<Vec<String>>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    entries: Vec<Entry>,
    searches: Vec<SearchRecord>,
    opened: usize,
    closed: usize,
    unreachable: bool,
    failing_searches: bool,
    sentinel: bool,
}

/// An in-memory directory.
///
/// Clones share the same entries and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory holding `entries`.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let directory = Self::new();
        for entry in entries {
            directory.insert(entry);
        }
        directory
    }

    /// Adds an entry. Entries are returned in insertion order.
    pub fn insert(&self, entry: Entry) {
        self.state().entries.push(entry);
    }

    /// Makes every subsequent connection attempt fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Makes every subsequent search fail.
    pub fn set_failing_searches(&self, failing: bool) {
        self.state().failing_searches = failing;
    }

    /// Answers searches without matches with one empty pseudo-record.
    ///
    /// Some directories do this instead of returning nothing.
    pub fn set_sentinel(&self, sentinel: bool) {
        self.state().sentinel = sentinel;
    }

    /// Every search received so far, oldest first.
    #[must_use]
    pub fn searches(&self) -> Vec<SearchRecord> {
        self.state().searches.clone()
    }

    /// The most recent search.
    #[must_use]
    pub fn last_search(&self) -> Option<SearchRecord> {
        self.state().searches.last().cloned()
    }

    /// Number of connections opened.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.state().opened
    }

    /// Number of connections closed.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.state().closed
    }

    /// A handle for this directory rooted at `base_dn`.
    #[must_use]
    pub fn handle(&self, base_dn: &str) -> DirectoryHandle {
        let config = DirectoryConfig::default()
            .with_server(MEMORY_SERVER)
            .with_base_dn(base_dn);
        DirectoryHandle::with_connector(config, Arc::new(self.clone()))
    }

    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MemoryDirectory {
    fn connect(&self, _config: &DirectoryConfig) -> Result<Box<dyn DirectoryConnection>> {
        let mut state = self.state();
        if state.unreachable {
            return Err(Error::connection("connect", "directory unreachable"));
        }
        state.opened += 1;
        Ok(Box::new(MemoryConnection {
            directory: self.clone(),
            closed: false,
        }))
    }
}

/// A connection to a [`MemoryDirectory`].
#[derive(Debug)]
pub struct MemoryConnection {
    directory: MemoryDirectory,
    closed: bool,
}

impl DirectoryConnection for MemoryConnection {
    fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: Option<&[String]>,
    ) -> Result<Vec<Entry>> {
        if self.closed {
            return Err(Error::connection("search", "connection already closed"));
        }
        let expr = Filter::parse(filter)?;

        let mut state = self.directory.state();
        state.searches.push(SearchRecord {
            base: base.to_string(),
            filter: filter.to_string(),
            attributes: attributes.map(<[String]>::to_vec),
        });
        if state.failing_searches {
            return Err(Error::connection("search", "search rejected"));
        }

        let mut found: Vec<Entry> = state
            .entries
            .iter()
            .filter(|entry| in_subtree(&entry.dn, base) && expr.matches(entry))
            .map(|entry| project(entry, attributes))
            .collect();

        if found.is_empty() && state.sentinel {
            let mut sentinel = Entry::new("");
            for key in attributes.unwrap_or_default() {
                sentinel.attributes.insert(key.clone(), Vec::new());
            }
            found.push(sentinel);
        }

        debug!(base, filter, count = found.len(), "Memory directory search");
        Ok(found)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.directory.state().closed += 1;
        }
        Ok(())
    }
}

fn in_subtree(dn: &str, base: &str) -> bool {
    if base.is_empty() {
        return true;
    }
    let dn = dn.to_ascii_lowercase();
    let base = base.to_ascii_lowercase();
    dn == base || dn.ends_with(&format!(",{base}"))
}

fn project(entry: &Entry, attributes: Option<&[String]>) -> Entry {
    let Some(keys) = attributes.filter(|keys| !keys.iter().any(|k| k == "*")) else {
        return entry.clone();
    };
    let mut projected = Entry::new(entry.dn.clone());
    for (key, values) in &entry.attributes {
        if keys.iter().any(|k| k.eq_ignore_ascii_case(key)) {
            projected.attributes.insert(key.clone(), values.clone());
        }
    }
    projected
}

/// A parsed search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Filter {
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Equal(String, String),
    Present(String),
    Substring(String, Vec<String>),
}

impl Filter {
    fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser {
            input: input.trim(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.input.len() {
            return Err(invalid_filter(input, "trailing characters"));
        }
        Ok(filter)
    }

    fn matches(&self, entry: &Entry) -> bool {
        match self {
            Self::And(parts) => parts.iter().all(|part| part.matches(entry)),
            Self::Or(parts) => parts.iter().any(|part| part.matches(entry)),
            Self::Not(inner) => !inner.matches(entry),
            Self::Present(key) => {
                key.eq_ignore_ascii_case("objectClass") || !values_of(entry, key).is_empty()
            },
            Self::Equal(key, value) => values_of(entry, key)
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(value)),
            Self::Substring(key, pieces) => values_of(entry, key)
                .iter()
                .any(|candidate| substring_match(&candidate.to_lowercase(), pieces)),
        }
    }
}

fn values_of<'a>(entry: &'a Entry, key: &str) -> &'a [String] {
    entry
        .attributes
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
        .map_or(&[], |(_, values)| values.as_slice())
}

/// `pieces` are the lowercased segments between `*`s; the first and last
/// are anchored and may be empty.
fn substring_match(value: &str, pieces: &[String]) -> bool {
    let (Some(first), Some(last)) = (pieces.first(), pieces.last()) else {
        return true;
    };
    if !value.starts_with(first.as_str()) {
        return false;
    }
    let mut rest = &value[first.len()..];
    for middle in &pieces[1..pieces.len() - 1] {
        match rest.find(middle.as_str()) {
            Some(at) => rest = &rest[at + middle.len()..],
            None => return false,
        }
    }
    pieces.len() == 1 || rest.ends_with(last.as_str())
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn filter(&mut self) -> Result<Filter> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.list()?)
            },
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.list()?)
            },
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            },
            _ => self.item()?,
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<Filter>> {
        let mut parts = Vec::new();
        while self.peek() == Some(b'(') {
            parts.push(self.filter()?);
        }
        if parts.is_empty() {
            return Err(invalid_filter(self.input, "empty filter list"));
        }
        Ok(parts)
    }

    fn item(&mut self) -> Result<Filter> {
        let rest = &self.input[self.pos..];
        let end = rest
            .find(')')
            .ok_or_else(|| invalid_filter(self.input, "unterminated item"))?;
        let item = &rest[..end];
        self.pos += end;

        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| invalid_filter(self.input, "missing '='"))?;
        if key.is_empty() || key.ends_with(['~', '<', '>', ':']) {
            return Err(invalid_filter(self.input, "unsupported comparison"));
        }
        let key = key.to_string();

        if value == "*" {
            return Ok(Filter::Present(key));
        }
        if value.contains('*') {
            let pieces = value
                .split('*')
                .map(|piece| unescape(piece).map(|p| p.to_lowercase()))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Filter::Substring(key, pieces));
        }
        Ok(Filter::Equal(key, unescape(value)?))
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(invalid_filter(
                self.input,
                &format!("expected '{}' at {}", char::from(byte), self.pos),
            ))
        }
    }
}

/// Decodes `\XX` hex escapes.
fn unescape(value: &str) -> Result<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = value
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| invalid_filter(value, "bad escape"))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn invalid_filter(filter: &str, reason: &str) -> Error {
    Error::connection("search", format!("invalid filter '{filter}': {reason}"))
}
