#![forbid(unsafe_code)]

//! Ordered multi-map view over a query string.
//!
//! A [`SearchParams`] keeps its decoded entries and a cached canonical
//! string. Every mutator renders the entries before and after the change
//! with the view's own encoder and normalizes both the way a location
//! query is normalized; only a byte-level difference updates the cache and
//! notifies subscribers. A freshly built view caches its source string
//! verbatim, so `to_string()` reproduces the query it was built from until
//! the first real mutation.
//!
//! A rendering that is not a valid query (a raw `#`, a control character)
//! fails the mutator and leaves the view untouched.
//!
//! With `join_arrays` on, several values of one name live in a single
//! stored value joined by the configured separator; [`SearchParams::get_all`]
//! splits them again.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use navsync_reactive::{Observable, Subscription, run_atomically};
use tracing::trace;
use url::form_urlencoded;

use crate::config::{Encoder, SyncConfig};
use crate::error::{Result, SyncError};
use crate::normalize::{QUERY_PREFIX, canonical_query, normalize_affixed, query_body};

/// Value side of a [`SearchParams::merge`] source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParamValue {
    /// No value. Dropped when `skip_empty_values` is on, otherwise stored
    /// as an explicit empty value.
    #[default]
    Absent,
    Single(String),
    Many(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Single(value.clone())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Many(values.into_iter().map(str::to_owned).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}

/// Options for [`SearchParams::to_string_with`].
#[derive(Debug, Clone, Default)]
pub struct ToStringOptions {
    /// Prepend `?` when the result is non-empty.
    pub with_prefix: bool,
    /// Render with this encoder instead of the configured one.
    pub encoder: Option<Encoder>,
}

impl ToStringOptions {
    #[must_use]
    pub fn with_prefix(mut self) -> Self {
        self.with_prefix = true;
        self
    }

    #[must_use]
    pub fn encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = Some(encoder);
        self
    }
}

type Entries = Vec<(String, String)>;

/// Receives the normalized query (with its `?`) inside the mutator's batch.
pub(crate) type QueryBinding = Rc<dyn Fn(&str) -> Result<()>>;

struct ParamsInner {
    config: SyncConfig,
    entries: RefCell<Entries>,
    canonical: Observable<String>,
    binding: RefCell<Option<QueryBinding>>,
}

/// Reactive, ordered multi-map of query parameters.
///
/// Cloning yields another handle to the same view.
#[derive(Clone)]
pub struct SearchParams {
    inner: Rc<ParamsInner>,
}

impl fmt::Debug for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchParams")
            .field("entries", &self.inner.entries.borrow())
            .field("canonical", &self.inner.canonical.get())
            .field("observable", &self.is_observable())
            .finish()
    }
}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.canonical.with(|canonical| f.write_str(canonical))
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::new("")
    }
}

impl SearchParams {
    /// Parse `query` (with or without its leading `?`) using the default
    /// configuration.
    #[must_use]
    pub fn new(query: &str) -> Self {
        Self::with_config(query, SyncConfig::default())
    }

    #[must_use]
    pub fn with_config(query: &str, config: SyncConfig) -> Self {
        let source = query_body(query.trim());
        let entries = parse(source);
        Self::from_parts(entries, source.to_owned(), config)
    }

    /// Build a view from name/value pairs with merge semantics.
    #[must_use]
    pub fn from_pairs<I, K, V>(source: I, config: SyncConfig) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        Self::with_config("", config).copy_with(source, None)
    }

    fn from_parts(entries: Entries, canonical: String, config: SyncConfig) -> Self {
        Self {
            inner: Rc::new(ParamsInner {
                config,
                entries: RefCell::new(entries),
                canonical: Observable::new(canonical),
                binding: RefCell::new(None),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// First stored value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.inner
            .entries
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Every value for `name`, splitting joined values.
    ///
    /// In join mode a stored value is split on every occurrence of the
    /// separator, including one that came from a single `set` value: with
    /// the default `,`, `set("x", "a,b")` reads back as `["a", "b"]`.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<String> {
        let entries = self.inner.entries.borrow();
        let values = entries.iter().filter(|(n, _)| n == name).map(|(_, v)| v.as_str());
        if self.inner.config.join_arrays {
            let separator = self.inner.config.join_arrays_with.as_str();
            values
                .flat_map(|v| v.split(separator))
                .map(str::to_owned)
                .collect()
        } else {
            values.map(str::to_owned).collect()
        }
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.inner.entries.borrow().iter().any(|(n, _)| n == name)
    }

    /// Distinct names in order of first appearance.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for (name, _) in self.inner.entries.borrow().iter() {
            if !keys.contains(name) {
                keys.push(name.clone());
            }
        }
        keys
    }

    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        self.inner.entries.borrow().clone()
    }

    /// Number of stored name/value pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Replace every value of `name` with `value`, keeping the position of
    /// the first occurrence. An empty value deletes `name` when
    /// `skip_empty_values` is on.
    pub fn set(&self, name: &str, value: &str) -> Result<bool> {
        self.mutate("set", |entries, config| {
            if value.is_empty() && config.skip_empty_values {
                entries.retain(|(n, _)| n != name);
                return;
            }
            let mut seen = false;
            entries.retain_mut(|(n, v)| {
                if *n != name {
                    return true;
                }
                if seen {
                    return false;
                }
                seen = true;
                value.clone_into(v);
                true
            });
            if !seen {
                entries.push((name.to_owned(), value.to_owned()));
            }
        })
    }

    /// Add one value for `name`. In join mode the value is appended to the
    /// existing joined value.
    pub fn append(&self, name: &str, value: &str) -> Result<bool> {
        self.mutate("append", |entries, config| {
            if value.is_empty() && config.skip_empty_values {
                return;
            }
            if config.join_arrays
                && let Some((_, existing)) = entries.iter_mut().find(|(n, _)| n == name)
            {
                if !existing.is_empty() {
                    existing.push_str(&config.join_arrays_with);
                }
                existing.push_str(value);
                return;
            }
            entries.push((name.to_owned(), value.to_owned()));
        })
    }

    /// Remove every value of `name`.
    pub fn delete(&self, name: &str) -> Result<bool> {
        self.mutate("delete", |entries, _| entries.retain(|(n, _)| n != name))
    }

    /// Stable sort by name.
    pub fn sort(&self) -> Result<bool> {
        self.mutate("sort", |entries, _| entries.sort_by(|a, b| a.0.cmp(&b.0)))
    }

    /// For each name in `source`, drop its values and add the new ones.
    pub fn merge<I, K, V>(&self, source: I) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        self.mutate("merge", |entries, config| merge_into(entries, config, source))
    }

    pub fn delete_all(&self) -> Result<bool> {
        self.mutate("delete_all", |entries, _| entries.clear())
    }

    /// Clear, then merge `source`, as one change.
    pub fn replace<I, K, V>(&self, source: I) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        self.mutate("replace", |entries, config| {
            entries.clear();
            merge_into(entries, config, source);
        })
    }

    /// Independent view holding these entries with `source` merged over
    /// them. `config` defaults to this view's configuration.
    #[must_use]
    pub fn copy_with<I, K, V>(&self, source: I, config: Option<SyncConfig>) -> SearchParams
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let config = config.unwrap_or_else(|| self.inner.config.clone());
        let mut entries = self.entries();
        merge_into(&mut entries, &config, source);
        let canonical = render(&entries, &config, &config.encoder);
        Self::from_parts(entries, canonical, config)
    }

    /// Render with explicit options. Without an encoder override this is
    /// the cached canonical string.
    #[must_use]
    pub fn to_string_with(&self, options: &ToStringOptions) -> String {
        let body = match &options.encoder {
            Some(encoder) => render(&self.inner.entries.borrow(), &self.inner.config, encoder),
            None => self.inner.canonical.get(),
        };
        if options.with_prefix && !body.is_empty() {
            let mut out = String::with_capacity(body.len() + 1);
            out.push(QUERY_PREFIX);
            out.push_str(&body);
            out
        } else {
            body
        }
    }

    /// Fire `callback` with the canonical string after every change.
    pub fn subscribe(&self, callback: impl Fn(&str) + 'static) -> Subscription {
        self.inner.canonical.subscribe(move |canonical| callback(canonical))
    }

    /// Fire `callback` with the new values of `name` whenever
    /// [`get_all`](Self::get_all) for it changes.
    pub fn watch(&self, name: &str, callback: impl Fn(&[String]) + 'static) -> Subscription {
        let name = name.to_owned();
        let last = RefCell::new(self.get_all(&name));
        let weak: Weak<ParamsInner> = Rc::downgrade(&self.inner);
        self.inner.canonical.subscribe(move |_| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let current = SearchParams { inner }.get_all(&name);
            if *last.borrow() == current {
                return;
            }
            last.replace(current.clone());
            callback(&current);
        })
    }

    /// Route every committed change to `binding` as well, in the same batch
    /// as the view's own notification.
    pub(crate) fn bind(&self, binding: QueryBinding) {
        self.inner.binding.replace(Some(binding));
    }

    /// Stop notifying. Mutators keep working on the detached view.
    pub fn detach(&self) {
        self.inner.binding.replace(None);
        self.inner.canonical.detach();
    }

    #[must_use]
    pub fn is_observable(&self) -> bool {
        self.inner.canonical.is_observable()
    }

    fn mutate(&self, op: &'static str, f: impl FnOnce(&mut Entries, &SyncConfig)) -> Result<bool> {
        let config = &self.inner.config;
        let (before, mut next) = {
            let entries = self.inner.entries.borrow();
            (render(&entries, config, &config.encoder), entries.clone())
        };
        f(&mut next, config);
        let query = canonical_query(&render(&next, config, &config.encoder))?;
        let after = query_body(&query).to_owned();

        if normalize_affixed(&before, QUERY_PREFIX) == query {
            trace!(target: "navsync.params", op, "parameter mutation left the query unchanged");
            self.inner.entries.replace(next);
            return Ok(false);
        }
        trace!(target: "navsync.params", op, query = %after, "parameter mutation");
        let binding = self.inner.binding.borrow().clone();
        run_atomically(|| {
            self.inner.entries.replace(next);
            let changed = self.inner.canonical.set(after)?;
            if let Some(binding) = binding {
                binding(&query)?;
            }
            Ok::<_, SyncError>(changed)
        })
    }
}

fn parse(source: &str) -> Entries {
    form_urlencoded::parse(source.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect()
}

fn render(entries: &[(String, String)], config: &SyncConfig, encoder: &Encoder) -> String {
    let mut out = String::new();
    for (i, (name, value)) in entries.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(&encoder.encode(name));
        out.push('=');
        if config.join_arrays {
            let separator = config.join_arrays_with.as_str();
            for (j, piece) in value.split(separator).enumerate() {
                if j > 0 {
                    out.push_str(separator);
                }
                out.push_str(&encoder.encode(piece));
            }
        } else {
            out.push_str(&encoder.encode(value));
        }
    }
    out
}

fn merge_into<I, K, V>(entries: &mut Entries, config: &SyncConfig, source: I)
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<ParamValue>,
{
    for (name, value) in source {
        let name: String = name.into();
        entries.retain(|(n, _)| *n != name);
        let mut values = match value.into() {
            ParamValue::Absent => Vec::new(),
            ParamValue::Single(value) => vec![value],
            ParamValue::Many(values) => values,
        };
        if config.skip_empty_values {
            values.retain(|v| !v.is_empty());
            if values.is_empty() {
                continue;
            }
        } else if values.is_empty() {
            values.push(String::new());
        }
        if config.join_arrays {
            entries.push((name, values.join(&config.join_arrays_with)));
        } else {
            entries.extend(values.into_iter().map(|v| (name.clone(), v)));
        }
    }
}
