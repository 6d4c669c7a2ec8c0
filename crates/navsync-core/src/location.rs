#![forbid(unsafe_code)]

//! Field-addressable, reactive location record.
//!
//! A [`Location`] holds `path`, `query`, `fragment`, and `state`, each in
//! its own [`Observable`] so callers can subscribe at field granularity.
//! Write interceptors canonicalize every proposed value, so a write that
//! normalizes to the stored value is suppressed before anything is stored
//! or notified.

use std::fmt;
use std::rc::Rc;

use navsync_backend::Entry;
use navsync_reactive::{Intercept, Observable, Subscription, run_atomically};
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{LocationError, Result, SyncError};
use crate::normalize::{
    LocationInput, Resolve, canonical_entry, canonical_fragment, canonical_path,
    canonical_path_field, canonical_query, compose,
};

struct LocationInner {
    path: Observable<String>,
    query: Observable<String>,
    fragment: Observable<String>,
    state: Observable<Value>,
    _normalizers: [Subscription; 3],
}

/// Live location handle. Clones share the same fields.
#[derive(Clone)]
pub struct Location {
    inner: Rc<LocationInner>,
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("href", &self.href())
            .field("state", &self.state())
            .field("observable", &self.is_observable())
            .finish()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href())
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::build(Entry::new("/"))
    }
}

impl Location {
    /// Build a location from an entry, validating and canonicalizing it.
    pub fn from_entry(entry: &Entry) -> std::result::Result<Self, LocationError> {
        Ok(Self::build(canonical_entry(entry)?))
    }

    /// A snapshot that takes part in no propagation.
    ///
    /// A malformed entry is kept as given rather than rejected.
    #[must_use]
    pub fn detached(entry: &Entry) -> Self {
        let location = Self::build(canonical_entry(entry).unwrap_or_else(|_| entry.clone()));
        location.detach();
        location
    }

    fn build(entry: Entry) -> Self {
        let path = Observable::new(entry.path);
        let query = Observable::new(entry.query);
        let fragment = Observable::new(entry.fragment);
        let normalizers = [
            path.intercept(|_, proposed| canonicalize("path", &proposed, canonical_path_field)),
            query.intercept(|_, proposed| canonicalize("query", &proposed, canonical_query)),
            fragment.intercept(|_, proposed| {
                canonicalize("fragment", &proposed, canonical_fragment)
            }),
        ];
        Self {
            inner: Rc::new(LocationInner {
                path,
                query,
                fragment,
                state: Observable::new(entry.state),
                _normalizers: normalizers,
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        self.inner.path.get()
    }

    /// Query including its leading `?`, or empty.
    #[must_use]
    pub fn query(&self) -> String {
        self.inner.query.get()
    }

    /// Fragment including its leading `#`, or empty.
    #[must_use]
    pub fn fragment(&self) -> String {
        self.inner.fragment.get()
    }

    #[must_use]
    pub fn state(&self) -> Value {
        self.inner.state.get()
    }

    /// Write the path. Returns `Ok(false)` when the trimmed value is
    /// already stored.
    pub fn set_path(&self, raw: &str) -> Result<bool> {
        let path = canonical_path_field(raw)?;
        Ok(self.inner.path.set(path)?)
    }

    pub fn set_query(&self, raw: &str) -> Result<bool> {
        let query = canonical_query(raw)?;
        Ok(self.inner.query.set(query)?)
    }

    pub fn set_fragment(&self, raw: &str) -> Result<bool> {
        let fragment = canonical_fragment(raw)?;
        Ok(self.inner.fragment.set(fragment)?)
    }

    pub fn set_state(&self, state: Value) -> Result<bool> {
        Ok(self.inner.state.set(state)?)
    }

    #[must_use]
    pub fn path_observable(&self) -> Observable<String> {
        self.inner.path.clone()
    }

    #[must_use]
    pub fn query_observable(&self) -> Observable<String> {
        self.inner.query.clone()
    }

    #[must_use]
    pub fn fragment_observable(&self) -> Observable<String> {
        self.inner.fragment.clone()
    }

    #[must_use]
    pub fn state_observable(&self) -> Observable<Value> {
        self.inner.state.clone()
    }

    /// Replace the whole location.
    ///
    /// String input is parsed; a missing path keeps the current one, other
    /// missing fields are cleared. When the canonical string is unchanged
    /// the assignment is dropped, otherwise every field is written in one
    /// batch.
    pub fn assign(&self, input: impl Into<LocationInput>) -> Result<bool> {
        let parts = canonical_path(input)?;
        let next = parts.resolve(&self.snapshot(), Resolve::Assign);
        let next_href = compose(&next.path, &next.query, &next.fragment);
        if next_href == self.href() {
            trace!(target: "navsync.engine", href = %next_href, "assignment unchanged");
            return Ok(false);
        }
        self.write_all(next)
    }

    /// Write every field of `entry`, including its state, as one batch.
    pub fn apply(&self, entry: &Entry) -> Result<bool> {
        let entry = canonical_entry(entry)?;
        self.write_all(entry)
    }

    /// Run `f` with notifications batched, so several field writes reach
    /// subscribers once.
    pub fn batch<R>(&self, f: impl FnOnce(&Location) -> Result<R>) -> Result<R> {
        run_atomically(|| f(self))
    }

    /// Current fields as an entry.
    #[must_use]
    pub fn snapshot(&self) -> Entry {
        Entry {
            path: self.path(),
            query: self.query(),
            fragment: self.fragment(),
            state: self.state(),
        }
    }

    /// Canonical `path?query#fragment` string.
    #[must_use]
    pub fn href(&self) -> String {
        self.inner.path.with(|path| {
            self.inner.query.with(|query| {
                self.inner
                    .fragment
                    .with(|fragment| compose(path, query, fragment))
            })
        })
    }

    #[must_use]
    pub fn is_observable(&self) -> bool {
        self.inner.path.is_observable()
    }

    /// Drop every subscriber and normalizer. Fields stay readable.
    pub fn detach(&self) {
        self.inner.path.detach();
        self.inner.query.detach();
        self.inner.fragment.detach();
        self.inner.state.detach();
    }

    fn write_all(&self, entry: Entry) -> Result<bool> {
        run_atomically(|| {
            let mut changed = self.inner.path.set(entry.path)?;
            changed |= self.inner.query.set(entry.query)?;
            changed |= self.inner.fragment.set(entry.fragment)?;
            changed |= self.inner.state.set(entry.state)?;
            Ok::<_, SyncError>(changed)
        })
    }
}

fn canonicalize(
    field: &'static str,
    proposed: &str,
    canonical: fn(&str) -> std::result::Result<String, LocationError>,
) -> Intercept<String> {
    match canonical(proposed) {
        Ok(value) => Intercept::Apply(value),
        Err(err) => {
            warn!(target: "navsync.engine", field, error = %err, "rejected malformed field write");
            Intercept::Reject
        }
    }
}
