#![forbid(unsafe_code)]

//! navsync keeps a navigation history, an editable [`Location`], and its
//! query parameters ([`SearchParams`]) in agreement.
//!
//! [`SyncedHistory`] wraps any [`NavigationBackend`]. It dereferences to the
//! backend, so every backend operation stays available, and adds the synced
//! views on top:
//!
//! ```rust,ignore
//! use navsync::prelude::*;
//!
//! let mut history = SyncedHistory::new(MemoryHistory::new(Entry::new("/a").with_query("?x=1")))?;
//! history.location().set_path("/b")?;              // one push: /b?x=1
//! history.search_params().unwrap().set("x", "2")?;  // one push: /b?x=2
//! history.go_back()?;                               // location follows: /b?x=1
//! history.merge("/c", true)?;                       // replace in place
//! let backend = history.destroy();
//! ```
//!
//! # Crates
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `navsync_reactive` | Observables, interceptors, batching |
//! | [`navsync_backend`] | Backend trait and the in-memory history |
//! | [`navsync_core`] | Normalizer, parameter view, location, engine |

use std::ops::Deref;
use std::rc::Rc;

use tracing::debug;

#[cfg(feature = "tracing-json")]
pub mod logging;

pub use navsync_backend::{Action, Entry, MemoryHistory, MemoryHistoryConfig, NavigationBackend};
pub use navsync_core::{
    Encoder, Location, LocationInput, LocationParts, ParamValue, ParamsSource, Result, SearchParams,
    SyncConfig, SyncEngine, SyncError, SyncStats,
};

/// Common imports.
pub mod prelude {
    pub use crate::SyncedHistory;
    pub use navsync_backend::{Action, Entry, MemoryHistory, NavigationBackend};
    pub use navsync_core::{
        Encoder, Location, LocationParts, ParamValue, SearchParams, SyncConfig, SyncError,
    };
}

/// A navigation backend with a synchronized location and parameter view.
///
/// After [`destroy`](Self::destroy) the history still dereferences to the
/// backend, but the synced operations are inert: [`location`](Self::location)
/// returns a detached snapshot of the backend's current entry,
/// [`search_params`](Self::search_params) returns `None`, and writes through
/// the facade are ignored.
pub struct SyncedHistory<B: NavigationBackend + 'static> {
    backend: Rc<B>,
    engine: Option<SyncEngine<B>>,
    last_action: Action,
    last_stats: SyncStats,
}

impl<B: NavigationBackend + 'static> SyncedHistory<B> {
    /// Wrap `backend` with the default configuration.
    pub fn new(backend: B) -> Result<Self> {
        Self::with_config(backend, SyncConfig::default())
    }

    pub fn with_config(backend: B, config: SyncConfig) -> Result<Self> {
        Self::from_rc(Rc::new(backend), config)
    }

    /// Wrap a backend that is shared with other owners.
    pub fn from_rc(backend: Rc<B>, config: SyncConfig) -> Result<Self> {
        let engine = SyncEngine::new(Rc::clone(&backend), config)?;
        Ok(Self {
            backend,
            engine: Some(engine),
            last_action: Action::Pop,
            last_stats: SyncStats::default(),
        })
    }

    /// The live location, or a detached snapshot once destroyed.
    #[must_use]
    pub fn location(&self) -> Location {
        match &self.engine {
            Some(engine) => engine.location(),
            None => Location::detached(&self.backend.current_entry()),
        }
    }

    /// Assign the whole location.
    pub fn set_location(&self, input: impl Into<LocationInput>) -> Result<bool> {
        match &self.engine {
            Some(engine) => engine.set_location(input),
            None => Ok(self.ignored("set_location")),
        }
    }

    #[must_use]
    pub fn search_params(&self) -> Option<SearchParams> {
        self.engine.as_ref().and_then(SyncEngine::search_params)
    }

    /// Replace the query from a string or name/value pairs.
    pub fn set_search_params(&self, source: impl Into<ParamsSource>) -> Result<bool> {
        match &self.engine {
            Some(engine) => engine.set_search_params(source),
            None => Ok(self.ignored("set_search_params")),
        }
    }

    /// Most recent navigation method.
    #[must_use]
    pub fn action(&self) -> Action {
        self.engine.as_ref().map_or(self.last_action, SyncEngine::action)
    }

    /// Complete `partial` over the current location and push it, or replace
    /// the current entry when `replace` is set.
    pub fn merge(&self, partial: impl Into<LocationInput>, replace: bool) -> Result<()> {
        match &self.engine {
            Some(engine) => engine.merge(partial, replace),
            None => {
                self.ignored("merge");
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.engine.as_ref().map_or(self.last_stats, SyncEngine::stats)
    }

    #[must_use]
    pub fn engine(&self) -> Option<&SyncEngine<B>> {
        self.engine.as_ref()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.engine.is_none()
    }

    /// Stop synchronizing and hand back the backend. Idempotent.
    pub fn destroy(&mut self) -> Rc<B> {
        if let Some(engine) = self.engine.take() {
            self.last_action = engine.action();
            self.last_stats = engine.stats();
            engine.destroy();
        }
        Rc::clone(&self.backend)
    }

    fn ignored(&self, op: &'static str) -> bool {
        debug!(target: "navsync.engine", op, "ignored write on a destroyed history");
        false
    }
}

impl<B: NavigationBackend + 'static> Deref for SyncedHistory<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.backend
    }
}

impl<B: NavigationBackend + 'static> std::fmt::Debug for SyncedHistory<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncedHistory")
            .field("location", &self.location())
            .field("action", &self.action())
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}
