#![forbid(unsafe_code)]

//! Observable value wrapper with change notification, write interception,
//! and version tracking.
//!
//! # Design
//!
//! [`Observable<T>`] wraps a value of type `T` in shared, reference-counted
//! storage (`Rc<RefCell<..>>`). A write first passes through every live
//! interceptor in registration order; each may rewrite the proposed value or
//! reject it outright. The surviving value is compared against the stored
//! one by `PartialEq`; only a real change is stored, bumps the version, and
//! notifies subscribers in registration order.
//!
//! Reactions may fail. [`Observable::react`] registers a callback returning
//! `Result<(), ReactionError>`; the first failure of a notification pass is
//! returned from [`Observable::set`] after every callback has run.
//!
//! # Failure Modes
//!
//! - **Subscriber leak**: If `Subscription` guards are stored indefinitely
//!   without being dropped, callbacks accumulate. Dead weak references are
//!   cleaned lazily during `notify()`.
//! - **Detached writes**: After [`Observable::detach`] the value is still
//!   writable but nothing intercepts or observes it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::batch;
use crate::error::ReactionError;

type Reaction<T> = dyn Fn(&T) -> Result<(), ReactionError>;
type CallbackRc<T> = Rc<Reaction<T>>;

/// A reaction that can be registered on several observables at once.
pub type SharedReaction<T> = Rc<dyn Fn(&T) -> Result<(), ReactionError>>;
type CallbackWeak<T> = Weak<Reaction<T>>;

type Interceptor<T> = dyn Fn(&T, T) -> Intercept<T>;
type InterceptorRc<T> = Rc<Interceptor<T>>;
type InterceptorWeak<T> = Weak<Interceptor<T>>;

/// Verdict of a write interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intercept<T> {
    /// Continue the write with this (possibly rewritten) value.
    Apply(T),
    /// Drop the write. Nothing is stored and nobody is notified.
    Reject,
}

/// Shared interior for [`Observable<T>`].
struct ObservableInner<T> {
    value: T,
    version: u64,
    attached: bool,
    /// Subscribers stored as weak references. Dead entries are pruned on notify.
    subscribers: Vec<CallbackWeak<T>>,
    interceptors: Vec<InterceptorWeak<T>>,
}

/// A shared, version-tracked value with change notification.
///
/// Cloning an `Observable` creates a new handle to the **same** inner state:
/// both handles see the same value, interceptors, and subscribers.
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 on each value-changing mutation.
/// 2. A write whose intercepted value equals the current value is a no-op.
/// 3. Subscribers are notified in registration order.
/// 4. Dead subscribers and interceptors are pruned lazily.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("attached", &inner.attached)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a new observable with the given initial value.
    ///
    /// The initial version is 0 and no subscribers are registered.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                attached: true,
                subscribers: Vec::new(),
                interceptors: Vec::new(),
            })),
        }
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Propose a new value.
    ///
    /// The value runs through the interceptors first. Returns `Ok(true)` when
    /// the stored value changed, `Ok(false)` when the write was rejected or
    /// equal to the current value. Inside a batch the notification is
    /// deferred and reaction errors surface from the batch commit instead.
    ///
    /// Safe to call re-entrantly from within subscriber callbacks.
    pub fn set(&self, value: T) -> Result<bool, ReactionError> {
        let Some(value) = self.intercept_write(value) else {
            trace!(target: "navsync.reactive", "write rejected by interceptor");
            return Ok(false);
        };
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return Ok(false);
            }
            inner.value = value;
            inner.version += 1;
        }
        self.notify()?;
        Ok(true)
    }

    /// Modify the value via a closure operating on a copy. The result is
    /// written through [`Observable::set`], interceptors included.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<bool, ReactionError> {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    /// Subscribe to value changes with an infallible callback.
    ///
    /// Returns a [`Subscription`] guard. Dropping the guard unsubscribes
    /// the callback.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.react(move |value| {
            callback(value);
            Ok(())
        })
    }

    /// Subscribe a fallible reaction. A returned error aborts the write that
    /// triggered it (the value stays written; the error reaches the caller).
    pub fn react(
        &self,
        reaction: impl Fn(&T) -> Result<(), ReactionError> + 'static,
    ) -> Subscription {
        self.react_shared(Rc::new(reaction))
    }

    /// Subscribe a reaction that may also be registered on other observables.
    ///
    /// Registrations of the same `Rc` count as one callback inside a batch:
    /// it fires once per flush no matter how many of its sources changed.
    pub fn react_shared(&self, reaction: SharedReaction<T>) -> Subscription {
        let strong: CallbackRc<T> = reaction;
        {
            let mut inner = self.inner.borrow_mut();
            if inner.attached {
                inner.subscribers.push(Rc::downgrade(&strong));
            }
        }
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Install a write interceptor. It receives the current value and the
    /// proposed one and decides what, if anything, gets stored.
    pub fn intercept(&self, interceptor: impl Fn(&T, T) -> Intercept<T> + 'static) -> Subscription {
        let strong: InterceptorRc<T> = Rc::new(interceptor);
        {
            let mut inner = self.inner.borrow_mut();
            if inner.attached {
                inner.interceptors.push(Rc::downgrade(&strong));
            }
        }
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Drop every subscriber and interceptor and stop accepting new ones.
    ///
    /// The value itself stays readable and writable as a plain cell.
    pub fn detach(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.attached = false;
        inner.subscribers.clear();
        inner.interceptors.clear();
    }

    /// Whether the observable still participates in change propagation.
    #[must_use]
    pub fn is_observable(&self) -> bool {
        self.inner.borrow().attached
    }

    /// Current version number. Increments by 1 on each value-changing
    /// mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of currently registered subscribers (including dead ones
    /// not yet pruned).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    fn intercept_write(&self, value: T) -> Option<T> {
        let interceptors: Vec<InterceptorRc<T>> = {
            let mut inner = self.inner.borrow_mut();
            inner.interceptors.retain(|w| w.strong_count() > 0);
            inner.interceptors.iter().filter_map(Weak::upgrade).collect()
        };
        if interceptors.is_empty() {
            return Some(value);
        }
        let current = self.get();
        let mut proposed = value;
        for interceptor in &interceptors {
            match interceptor(&current, proposed) {
                Intercept::Apply(next) => proposed = next,
                Intercept::Reject => return None,
            }
        }
        Some(proposed)
    }

    /// Notify live subscribers and prune dead ones.
    ///
    /// If a batch scope is active (see [`crate::batch::BatchScope`]),
    /// notifications are deferred until the batch commits.
    fn notify(&self) -> Result<(), ReactionError> {
        // Collect live callbacks first (to avoid holding the borrow during calls).
        let callbacks: Vec<CallbackRc<T>> = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|w| w.strong_count() > 0);
            inner.subscribers.iter().filter_map(Weak::upgrade).collect()
        };

        if callbacks.is_empty() {
            return Ok(());
        }

        if batch::is_batching() {
            for cb in callbacks {
                let callback_key = Rc::as_ptr(&cb) as *const () as usize;
                let source = self.clone();
                batch::defer_keyed(callback_key, move || {
                    let latest = source.get();
                    cb(&latest)
                })?;
            }
            return Ok(());
        }

        let value = self.get();
        let mut first_error = None;
        for cb in &callbacks {
            if let Err(err) = cb(&value)
                && first_error.is_none()
            {
                first_error = Some(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// RAII guard for a subscriber callback or write interceptor.
///
/// Dropping the `Subscription` makes the associated callback unreachable:
/// the strong `Rc` is dropped, so the `Weak` held by the observable fails to
/// upgrade on the next write.
pub struct Subscription {
    /// Type-erased strong reference keeping the callback `Rc` alive.
    _guard: Box<dyn std::any::Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
