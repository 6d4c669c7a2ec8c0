#![forbid(unsafe_code)]

//! In-memory navigation log.
//!
//! [`MemoryHistory`] keeps an ordered list of entries and a cursor, the way
//! a platform history does:
//!
//! ```text
//! push(/c)
//! ┌──────────────────────────────────────┐
//! │ entries: [/a, /b, /c]   cursor: 2    │
//! └──────────────────────────────────────┘
//!
//! go_back() x2
//! ┌──────────────────────────────────────┐
//! │ entries: [/a, /b, /c]   cursor: 0    │
//! └──────────────────────────────────────┘
//!
//! push(/d)  <-- new branch, drops forward entries
//! ┌──────────────────────────────────────┐
//! │ entries: [/a, /d]       cursor: 1    │
//! └──────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! 1. `entries` is never empty and `cursor < entries.len()`.
//! 2. `entries.len() <= config.max_entries` after every operation.
//! 3. Listeners run after the state change, outside any internal borrow,
//!    in registration order.
//! 4. Out-of-range traversal is a silent no-op and notifies nobody.

use std::cell::{Cell, RefCell};
use std::fmt;

use tracing::{debug, trace};

use crate::{Action, BackendError, Entry, Listener, ListenerId, NavigationBackend};

/// Configuration for [`MemoryHistory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryHistoryConfig {
    /// Maximum number of entries kept; the oldest are evicted first.
    pub max_entries: usize,
}

impl Default for MemoryHistoryConfig {
    fn default() -> Self {
        Self { max_entries: 1000 }
    }
}

impl MemoryHistoryConfig {
    /// Configuration without an entry limit.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_entries: usize::MAX,
        }
    }
}

/// Operation counters for a [`MemoryHistory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub pushes: u64,
    pub replaces: u64,
    pub pops: u64,
}

struct HistoryState {
    entries: Vec<Entry>,
    cursor: usize,
}

/// Navigation log held entirely in memory.
pub struct MemoryHistory {
    state: RefCell<HistoryState>,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener: Cell<u64>,
    config: MemoryHistoryConfig,
    stats: Cell<BackendStats>,
}

impl fmt::Debug for MemoryHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryHistory")
            .field("entries", &state.entries.len())
            .field("cursor", &state.cursor)
            .field("listeners", &self.listeners.borrow().len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(Entry::new("/"))
    }
}

impl MemoryHistory {
    /// History holding a single initial entry.
    #[must_use]
    pub fn new(initial: Entry) -> Self {
        Self::with_entries(vec![initial], 0, MemoryHistoryConfig::default())
    }

    /// History with pre-seeded entries and cursor.
    ///
    /// An empty `entries` list is seeded with `/`; the cursor is clamped into
    /// range and the list is trimmed to `config.max_entries`.
    #[must_use]
    pub fn with_entries(entries: Vec<Entry>, cursor: usize, config: MemoryHistoryConfig) -> Self {
        let mut entries = entries;
        if entries.is_empty() {
            entries.push(Entry::new("/"));
        }
        let cursor = cursor.min(entries.len() - 1);
        let history = Self {
            state: RefCell::new(HistoryState { entries, cursor }),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
            config,
            stats: Cell::new(BackendStats::default()),
        };
        history.enforce_limit();
        history
    }

    /// Cursor position.
    #[must_use]
    pub fn index(&self) -> usize {
        self.state.borrow().cursor
    }

    /// Copy of every entry in order.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.state.borrow().entries.clone()
    }

    #[must_use]
    pub fn can_go_back(&self) -> bool {
        self.state.borrow().cursor > 0
    }

    #[must_use]
    pub fn can_go_forward(&self) -> bool {
        let state = self.state.borrow();
        state.cursor + 1 < state.entries.len()
    }

    #[must_use]
    pub fn stats(&self) -> BackendStats {
        self.stats.get()
    }

    #[must_use]
    pub fn config(&self) -> MemoryHistoryConfig {
        self.config
    }

    /// Move the cursor by `delta` entries.
    ///
    /// Traversal that would leave the log is ignored, as is `delta == 0`.
    pub fn go(&self, delta: isize) -> Result<(), BackendError> {
        {
            let mut state = self.state.borrow_mut();
            let Some(target) = state.cursor.checked_add_signed(delta) else {
                trace!(target: "navsync.backend", delta, "traversal before start ignored");
                return Ok(());
            };
            if delta == 0 || target >= state.entries.len() {
                trace!(target: "navsync.backend", delta, "traversal ignored");
                return Ok(());
            }
            state.cursor = target;
        }
        self.bump(|s| s.pops += 1);
        self.notify(Action::Pop)
    }

    fn enforce_limit(&self) {
        let max = self.config.max_entries.max(1);
        let mut state = self.state.borrow_mut();
        if state.entries.len() <= max {
            return;
        }
        let overflow = state.entries.len() - max;
        state.entries.drain(..overflow);
        state.cursor = state.cursor.saturating_sub(overflow);
        debug!(target: "navsync.backend", evicted = overflow, "evicted oldest entries");
    }

    fn bump(&self, f: impl FnOnce(&mut BackendStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// Call every listener with the current entry. All listeners run; the
    /// first failure is returned.
    fn notify(&self, action: Action) -> Result<(), BackendError> {
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Listener::clone(listener))
            .collect();
        if listeners.is_empty() {
            return Ok(());
        }
        let entry = self.current_entry();
        let mut first_error = None;
        for listener in &listeners {
            if let Err(err) = listener(&entry, action)
                && first_error.is_none()
            {
                first_error = Some(err);
            }
        }
        first_error.map_or(Ok(()), |err| Err(BackendError::Listener(err)))
    }
}

impl NavigationBackend for MemoryHistory {
    fn current_entry(&self) -> Entry {
        let state = self.state.borrow();
        state.entries[state.cursor].clone()
    }

    fn push(&self, entry: Entry) -> Result<(), BackendError> {
        debug!(target: "navsync.backend", href = %entry.href(), "push");
        {
            let mut state = self.state.borrow_mut();
            let keep = state.cursor + 1;
            state.entries.truncate(keep);
            state.entries.push(entry);
            state.cursor = keep;
        }
        self.enforce_limit();
        self.bump(|s| s.pushes += 1);
        self.notify(Action::Push)
    }

    fn replace(&self, entry: Entry) -> Result<(), BackendError> {
        debug!(target: "navsync.backend", href = %entry.href(), "replace");
        {
            let mut state = self.state.borrow_mut();
            let cursor = state.cursor;
            state.entries[cursor] = entry;
        }
        self.bump(|s| s.replaces += 1);
        self.notify(Action::Replace)
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn go_back(&self) -> Result<(), BackendError> {
        self.go(-1)
    }

    fn go_forward(&self) -> Result<(), BackendError> {
        self.go(1)
    }

    fn entry_count(&self) -> usize {
        self.state.borrow().entries.len()
    }
}
