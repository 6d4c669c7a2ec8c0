#![forbid(unsafe_code)]
#![doc = "Navigation backend boundary for navsync."]
#![doc = ""]
#![doc = "This crate defines what the synchronization engine consumes from a navigation"]
#![doc = "log: the [`Entry`] and [`Action`] types and the [`NavigationBackend`] trait."]
#![doc = "Platform integrations implement the trait; [`MemoryHistory`] is the in-process"]
#![doc = "implementation used for headless hosts and tests."]

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub mod memory;

pub use memory::{BackendStats, MemoryHistory, MemoryHistoryConfig};

/// How the current entry was reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// A new entry was appended after the cursor.
    Push,
    /// The current entry was overwritten in place.
    Replace,
    /// The cursor moved to an existing entry (back/forward traversal, or the
    /// initial load).
    #[default]
    Pop,
}

impl Action {
    /// Upper-case label matching the platform history vocabulary.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "PUSH",
            Self::Replace => "REPLACE",
            Self::Pop => "POP",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point in the navigation log.
///
/// Backends hand entries out by value; the engine never mutates an entry the
/// backend owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Path portion, e.g. `/users/42`.
    pub path: String,
    /// Query portion including its leading `?`, or empty.
    #[serde(default)]
    pub query: String,
    /// Fragment portion including its leading `#`, or empty.
    #[serde(default)]
    pub fragment: String,
    /// Opaque application state attached to the entry.
    #[serde(default)]
    pub state: serde_json::Value,
}

impl Entry {
    /// Entry with the given path and nothing else.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    #[must_use]
    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = fragment.into();
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: serde_json::Value) -> Self {
        self.state = state;
        self
    }

    /// Raw concatenation of path, query, and fragment as stored.
    #[must_use]
    pub fn href(&self) -> String {
        let mut out = String::with_capacity(self.path.len() + self.query.len() + self.fragment.len());
        out.push_str(&self.path);
        out.push_str(&self.query);
        out.push_str(&self.fragment);
        out
    }
}

/// Callback invoked after the backend's current entry changed.
pub type Listener = Rc<dyn Fn(&Entry, Action) -> Result<(), ListenerError>>;

/// Wrap a closure as a [`Listener`].
pub fn listener(f: impl Fn(&Entry, Action) -> Result<(), ListenerError> + 'static) -> Listener {
    Rc::new(f)
}

/// Handle returned by [`NavigationBackend::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Navigation log abstraction.
///
/// All methods take `&self`: backends use interior mutability because
/// listeners are called synchronously and may read the backend again
/// (`current_entry`) or navigate from inside the callback. Implementations
/// must release internal borrows before invoking listeners.
pub trait NavigationBackend {
    /// Entry under the cursor.
    fn current_entry(&self) -> Entry;

    /// Append `entry` after the cursor, dropping any forward entries.
    fn push(&self, entry: Entry) -> Result<(), BackendError>;

    /// Overwrite the entry under the cursor.
    fn replace(&self, entry: Entry) -> Result<(), BackendError>;

    /// Register a listener, called after every change of the current entry.
    fn subscribe(&self, listener: Listener) -> ListenerId;

    /// Remove a listener. Returns `false` when it was not registered.
    fn unsubscribe(&self, id: ListenerId) -> bool;

    /// Move the cursor one entry back. No-op at the start of the log.
    fn go_back(&self) -> Result<(), BackendError>;

    /// Move the cursor one entry forward. No-op at the end of the log.
    fn go_forward(&self) -> Result<(), BackendError>;

    /// Number of entries in the log.
    fn entry_count(&self) -> usize;
}

impl<B: NavigationBackend + ?Sized> NavigationBackend for Rc<B> {
    fn current_entry(&self) -> Entry {
        (**self).current_entry()
    }

    fn push(&self, entry: Entry) -> Result<(), BackendError> {
        (**self).push(entry)
    }

    fn replace(&self, entry: Entry) -> Result<(), BackendError> {
        (**self).replace(entry)
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        (**self).subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        (**self).unsubscribe(id)
    }

    fn go_back(&self) -> Result<(), BackendError> {
        (**self).go_back()
    }

    fn go_forward(&self) -> Result<(), BackendError> {
        (**self).go_forward()
    }

    fn entry_count(&self) -> usize {
        (**self).entry_count()
    }
}

/// Failure reported by a listener.
///
/// The listener's own error is boxed so backends stay independent of the
/// engine's error types; [`ListenerError::downcast`] recovers it.
pub struct ListenerError {
    inner: Box<dyn StdError + 'static>,
}

impl ListenerError {
    pub fn new(error: impl StdError + 'static) -> Self {
        Self {
            inner: Box::new(error),
        }
    }

    /// Recover the concrete error, or give `self` back when the type differs.
    pub fn downcast<E: StdError + 'static>(self) -> Result<E, Self> {
        match self.inner.downcast::<E>() {
            Ok(concrete) => Ok(*concrete),
            Err(inner) => Err(Self { inner }),
        }
    }
}

impl fmt::Debug for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ListenerError").field(&self.inner).finish()
    }
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for ListenerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

/// Errors surfaced by backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The entry changed, but a listener failed while reacting to it.
    #[error("navigation listener failed: {0}")]
    Listener(ListenerError),
}
