#![forbid(unsafe_code)]

//! Bidirectional synchronization between a navigation backend, a
//! [`Location`], and a [`SearchParams`] view.
//!
//! # Propagation
//!
//! 1. **Backend event**: the listener records the action and applies the
//!    entry to the location in one batch while the engine is marked as
//!    syncing, so the resulting field reactions do not navigate again.
//! 2. **Location write**: after the field normalizers ran, the location
//!    reaction compares the location with the backend's current entry and
//!    pushes only when they differ. The backend echo comes back through
//!    rule 1 and finds nothing to change.
//! 3. **Parameter write**: the view hands its normalized query to the
//!    location inside the mutator's own batch, which continues as rule 2.
//!    A field write batched with it coalesces into the same push. The query
//!    reaction sees that the view already renders the new query and keeps
//!    it instead of rebuilding.
//! 4. **Merge**: a partial location is completed over the current one and
//!    handed straight to the backend as a push or a replace.
//!
//! A query change from any other source rebuilds the view; the previous
//! view is detached.
//!
//! # Ownership
//!
//! The engine state lives behind an `Rc`. Reactions and the backend
//! listener hold `Weak` handles to it, and the engine owns every
//! subscription guard, so dropping or destroying the engine releases all
//! of them.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use navsync_backend::{Action, Entry, ListenerError, ListenerId, NavigationBackend, listener};
use navsync_reactive::{Observable, ReactionError, SharedReaction, Subscription, run_atomically};
use serde_json::Value;
use tracing::{debug, debug_span, trace, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::location::Location;
use crate::normalize::{LocationInput, Resolve, canonical_entry, canonical_path, compose_entry, query_body};
use crate::search_params::{ParamValue, SearchParams};
use crate::stats::{StatsCell, SyncStats};

/// New contents for the parameter view.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamsSource {
    /// A query string, with or without its leading `?`.
    Query(String),
    /// Name/value pairs, merged into an empty view.
    Pairs(Vec<(String, ParamValue)>),
}

impl From<&str> for ParamsSource {
    fn from(value: &str) -> Self {
        Self::Query(value.to_owned())
    }
}

impl From<String> for ParamsSource {
    fn from(value: String) -> Self {
        Self::Query(value)
    }
}

impl From<&SearchParams> for ParamsSource {
    fn from(params: &SearchParams) -> Self {
        Self::Query(params.to_string())
    }
}

impl<K: Into<String>, V: Into<ParamValue>> From<Vec<(K, V)>> for ParamsSource {
    fn from(pairs: Vec<(K, V)>) -> Self {
        Self::Pairs(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Keeps a backend, a [`Location`], and a [`SearchParams`] view in
/// agreement.
///
/// All types are single-threaded. Dropping the engine tears it down like
/// [`SyncEngine::destroy`].
pub struct SyncEngine<B: NavigationBackend + 'static> {
    shared: Rc<Shared<B>>,
}

struct Shared<B: NavigationBackend + 'static> {
    me: Weak<Shared<B>>,
    backend: Rc<B>,
    config: SyncConfig,
    location: Location,
    action: Observable<Action>,
    params: RefCell<Option<SearchParams>>,
    reactions: RefCell<Vec<Subscription>>,
    listener: Cell<Option<ListenerId>>,
    active: Cell<bool>,
    syncing: Cell<u32>,
    stats: StatsCell,
}

/// Marks backend-originated application for as long as it lives.
struct SyncingGuard<'a>(&'a Cell<u32>);

impl<'a> SyncingGuard<'a> {
    fn enter(depth: &'a Cell<u32>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl<B: NavigationBackend + 'static> SyncEngine<B> {
    /// Start synchronizing with `backend`.
    ///
    /// Fails when the config does not validate or the backend's current
    /// entry is malformed.
    pub fn new(backend: Rc<B>, config: SyncConfig) -> Result<Self> {
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(SyncError::Config(problems));
        }
        let location = Location::from_entry(&backend.current_entry())?;
        let params = SearchParams::with_config(&location.query(), config.clone());

        let shared = Rc::new_cyclic(|me| Shared {
            me: me.clone(),
            backend,
            config,
            location,
            action: Observable::new(Action::Pop),
            params: RefCell::new(None),
            reactions: RefCell::new(Vec::new()),
            listener: Cell::new(None),
            active: Cell::new(true),
            syncing: Cell::new(0),
            stats: StatsCell::default(),
        });
        shared.install(params);
        debug!(
            target: "navsync.engine",
            href = %shared.location.href(),
            "sync engine started"
        );
        Ok(Self { shared })
    }

    /// The live location.
    #[must_use]
    pub fn location(&self) -> Location {
        self.shared.location.clone()
    }

    /// Assign the whole location. See [`Location::assign`].
    pub fn set_location(&self, input: impl Into<LocationInput>) -> Result<bool> {
        self.shared.location.assign(input)
    }

    /// The current parameter view, or `None` once destroyed.
    #[must_use]
    pub fn search_params(&self) -> Option<SearchParams> {
        self.shared.params.borrow().clone()
    }

    /// Replace the query through the location, as if written by hand.
    pub fn set_search_params(&self, source: impl Into<ParamsSource>) -> Result<bool> {
        let query = match source.into() {
            ParamsSource::Query(query) => query,
            ParamsSource::Pairs(pairs) => {
                SearchParams::from_pairs(pairs, self.shared.config.clone()).to_string()
            }
        };
        self.shared.location.set_query(&query)
    }

    /// Most recent navigation method.
    #[must_use]
    pub fn action(&self) -> Action {
        self.shared.action.get()
    }

    /// Observe the navigation method.
    #[must_use]
    pub fn action_observable(&self) -> Observable<Action> {
        self.shared.action.clone()
    }

    /// Complete `partial` over the current location and push it, or
    /// replace the current entry when `replace` is set.
    ///
    /// Empty fields in `partial` keep their current value.
    pub fn merge(&self, partial: impl Into<LocationInput>, replace: bool) -> Result<()> {
        self.shared.merge(partial.into(), replace)
    }

    #[must_use]
    pub fn backend(&self) -> &Rc<B> {
        &self.shared.backend
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.shared.stats.get()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.active.get()
    }

    /// Stop synchronizing. Idempotent.
    ///
    /// Unsubscribes from the backend, drops every reaction, and detaches
    /// the location and the parameter view. Handles obtained earlier keep
    /// their last values but no longer propagate.
    pub fn destroy(&self) {
        self.shared.destroy();
    }
}

impl<B: NavigationBackend + 'static> Drop for SyncEngine<B> {
    fn drop(&mut self) {
        self.shared.destroy();
    }
}

impl<B: NavigationBackend + 'static> std::fmt::Debug for SyncEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("location", &self.shared.location)
            .field("action", &self.action())
            .field("active", &self.is_active())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn with_shared<B, E>(
    weak: &Weak<Shared<B>>,
    f: impl FnOnce(&Shared<B>) -> std::result::Result<(), E>,
) -> std::result::Result<(), E>
where
    B: NavigationBackend + 'static,
{
    match weak.upgrade() {
        Some(shared) => f(&shared),
        None => Ok(()),
    }
}

impl<B: NavigationBackend + 'static> Shared<B> {
    fn install(&self, params: SearchParams) {
        let location = &self.location;
        let mut reactions = Vec::with_capacity(5);

        let weak = self.me.clone();
        reactions.push(
            location
                .query_observable()
                .react(move |query| with_shared(&weak, |s| s.on_query_change(query))),
        );

        let weak = self.me.clone();
        let on_field: SharedReaction<String> =
            Rc::new(move |_: &String| with_shared(&weak, Self::on_location_change));
        for field in [
            location.path_observable(),
            location.query_observable(),
            location.fragment_observable(),
        ] {
            reactions.push(field.react_shared(Rc::clone(&on_field)));
        }

        let weak = self.me.clone();
        let on_state: SharedReaction<Value> =
            Rc::new(move |_: &Value| with_shared(&weak, Self::on_location_change));
        reactions.push(location.state_observable().react_shared(on_state));

        self.reactions.replace(reactions);
        self.adopt_params(params);

        let weak = self.me.clone();
        let id = self.backend.subscribe(listener(move |entry, action| {
            with_shared(&weak, |s| s.on_backend_event(entry, action))
        }));
        self.listener.set(Some(id));
    }

    /// Make `params` the current view and route its changes to the query.
    fn adopt_params(&self, params: SearchParams) {
        let weak = self.me.clone();
        params.bind(Rc::new(move |query: &str| {
            with_shared(&weak, |s| s.on_params_write(query))
        }));
        if let Some(previous) = self.params.replace(Some(params)) {
            previous.detach();
        }
    }

    fn on_backend_event(&self, entry: &Entry, action: Action) -> std::result::Result<(), ListenerError> {
        if !self.active.get() {
            return Ok(());
        }
        self.stats.bump(|s| s.backend_events += 1);
        let _span = debug_span!("navsync.sync.backend", action = %action).entered();

        let entry = canonical_entry(entry).map_err(|err| {
            warn!(
                target: "navsync.backend",
                error = %err,
                "backend reported a malformed entry"
            );
            ListenerError::new(SyncError::from(err))
        })?;

        let _syncing = SyncingGuard::enter(&self.syncing);
        run_atomically(|| {
            self.action.set(action)?;
            let changed = self.location.apply(&entry)?;
            trace!(
                target: "navsync.backend",
                action = %action,
                href = %compose_entry(&entry),
                changed,
                "backend entry applied"
            );
            Ok::<_, SyncError>(())
        })
        .map_err(ListenerError::new)
    }

    fn on_location_change(&self) -> std::result::Result<(), ReactionError> {
        if !self.active.get() {
            return Ok(());
        }
        self.stats.bump(|s| s.reactions += 1);
        if self.syncing.get() > 0 {
            trace!(target: "navsync.engine", "location change came from the backend");
            return Ok(());
        }

        let next = self.location.snapshot();
        let href = compose_entry(&next);
        let _span = debug_span!("navsync.sync.local", href = %href).entered();
        let current = self.backend.current_entry();
        if href == compose_entry(&current) && next.state == current.state {
            self.stats.bump(|s| s.suppressed += 1);
            trace!(target: "navsync.engine", href = %href, "location already matches the backend");
            return Ok(());
        }

        debug!(target: "navsync.engine", href = %href, "pushing location");
        self.stats.bump(|s| s.pushes += 1);
        self.backend
            .push(next)
            .map_err(|err| ReactionError::new(SyncError::from(err)))
    }

    fn on_query_change(&self, query: &str) -> std::result::Result<(), ReactionError> {
        if !self.active.get() {
            return Ok(());
        }
        self.stats.bump(|s| s.reactions += 1);
        let current = self.params.borrow().clone();
        if let Some(view) = current
            && view.to_string() == query_body(query)
        {
            trace!(target: "navsync.params", query, "query written by the parameter view");
            return Ok(());
        }

        self.stats.bump(|s| s.params_rebuilds += 1);
        debug!(target: "navsync.params", query, "rebuilding parameter view");
        self.adopt_params(SearchParams::with_config(query, self.config.clone()));
        Ok(())
    }

    fn on_params_write(&self, query: &str) -> Result<()> {
        if !self.active.get() {
            return Ok(());
        }
        self.stats.bump(|s| s.reactions += 1);
        debug!(target: "navsync.params", query, "parameter view changed");
        self.location.set_query(query).map(drop)
    }

    fn merge(&self, partial: LocationInput, replace: bool) -> Result<()> {
        let _span = debug_span!("navsync.sync.merge", replace).entered();
        let next = canonical_path(partial)?.resolve(&self.location.snapshot(), Resolve::Merge);
        let href = compose_entry(&next);
        if replace {
            debug!(target: "navsync.engine", href = %href, "merge: replacing entry");
            self.stats.bump(|s| s.replaces += 1);
            self.backend.replace(next)?;
        } else {
            debug!(target: "navsync.engine", href = %href, "merge: pushing entry");
            self.stats.bump(|s| s.pushes += 1);
            self.backend.push(next)?;
        }
        Ok(())
    }

    fn destroy(&self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(id) = self.listener.take() {
            self.backend.unsubscribe(id);
        }
        drop(self.reactions.take());
        self.location.detach();
        self.action.detach();
        if let Some(params) = self.params.take() {
            params.detach();
        }
        let stats = self.stats.get();
        debug!(
            target: "navsync.engine",
            pushes = stats.pushes,
            replaces = stats.replaces,
            backend_events = stats.backend_events,
            "sync engine destroyed"
        );
    }
}
