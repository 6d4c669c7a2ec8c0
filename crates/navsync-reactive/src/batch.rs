#![forbid(unsafe_code)]

//! Batch update coalescing for [`Observable`](crate::Observable)
//! notifications.
//!
//! When several observables are written as one logical change, subscribers
//! would otherwise see every intermediate state. A batch defers all
//! notifications until the outermost scope commits, then fires each unique
//! callback once with the latest value.
//!
//! # Usage
//!
//! ```
//! use navsync_reactive::{Observable, run_atomically};
//!
//! let path = Observable::new(String::from("/a"));
//! let query = Observable::new(String::new());
//!
//! run_atomically(|| {
//!     path.set("/b".into())?;
//!     query.set("?x=1".into())?;
//!     Ok::<_, navsync_reactive::ReactionError>(())
//! })
//! .unwrap();
//! ```
//!
//! # Invariants
//!
//! 1. Nested batches are supported: only the outermost scope flushes.
//! 2. Within a batch, `Observable::get()` always returns the latest value
//!    (values are updated immediately, only notifications are deferred).
//! 3. After a batch exits, all subscribers see the final state, never an
//!    intermediate state.
//! 4. Flush calls deferred callbacks in the order they were first enqueued.
//! 5. Writes performed by callbacks during a flush notify immediately; the
//!    batch context is already closed, so nothing queued late is lost.
//!
//! # Failure Modes
//!
//! - **Reaction fails during flush**: Remaining callbacks are still called.
//!   The first error is returned from [`BatchScope::commit`] (or logged when
//!   the scope is merely dropped).

use std::cell::RefCell;

use tracing::{error, info_span};
use web_time::Instant;

use crate::error::ReactionError;

/// A deferred notification: fires a subscriber callback with the latest value.
type DeferredNotify = Box<dyn FnOnce() -> Result<(), ReactionError>>;

/// Deferred callback entry keyed for in-batch coalescing.
struct DeferredEntry {
    key: usize,
    notify: DeferredNotify,
}

/// Thread-local batch context.
struct BatchContext {
    /// Nesting depth. Only flush when this reaches 0.
    depth: u32,
    /// Queued notifications to fire on flush.
    deferred: Vec<DeferredEntry>,
}

thread_local! {
    static BATCH_CTX: RefCell<Option<BatchContext>> = const { RefCell::new(None) };
}

/// Returns true if a batch is currently active on this thread.
pub fn is_batching() -> bool {
    BATCH_CTX.with(|ctx| ctx.borrow().is_some())
}

/// Enqueue a deferred notification keyed by `key`, or run it now when no
/// batch is active.
///
/// If the key already exists in the current batch, the previously queued
/// callback is replaced so the latest callback wins while preserving the
/// original enqueue order. Returns `Ok(true)` if the notification was
/// deferred.
pub fn defer_keyed(
    key: usize,
    f: impl FnOnce() -> Result<(), ReactionError> + 'static,
) -> Result<bool, ReactionError> {
    let mut slot = Some(f);
    BATCH_CTX.with(|ctx| {
        let mut guard = ctx.borrow_mut();
        let Some(batch) = guard.as_mut() else {
            return;
        };
        let Some(f) = slot.take() else {
            return;
        };
        let notify: DeferredNotify = Box::new(f);
        if let Some(entry) = batch.deferred.iter_mut().find(|entry| entry.key == key) {
            entry.notify = notify;
        } else {
            batch.deferred.push(DeferredEntry { key, notify });
        }
    });
    match slot {
        // No batch was active: fire now, outside the context borrow.
        Some(f) => f().map(|()| false),
        None => Ok(true),
    }
}

/// Close the context and run every deferred notification.
fn flush(deferred: Vec<DeferredEntry>) -> Result<(), ReactionError> {
    if deferred.is_empty() {
        return Ok(());
    }

    let notifications = deferred.len() as u64;
    let started = Instant::now();
    let _span = info_span!(
        "reactive.flush",
        notifications,
        duration_us = tracing::field::Empty
    )
    .entered();

    let mut first_error = None;
    for entry in deferred {
        if let Err(err) = (entry.notify)()
            && first_error.is_none()
        {
            first_error = Some(err);
        }
    }

    let duration_us = started.elapsed().as_micros() as u64;
    tracing::Span::current().record("duration_us", duration_us);

    first_error.map_or(Ok(()), Err)
}

/// RAII guard that begins a batch scope.
///
/// While a `BatchScope` is alive, all observable notifications are deferred.
/// When the outermost scope commits or drops, all deferred notifications
/// fire. Nested scopes are supported; only the outermost one flushes.
pub struct BatchScope {
    is_root: bool,
    closed: bool,
}

impl BatchScope {
    /// Begin a new batch scope.
    ///
    /// If already inside a batch, this increments the nesting depth.
    #[must_use]
    pub fn new() -> Self {
        let is_root = BATCH_CTX.with(|ctx| {
            let mut guard = ctx.borrow_mut();
            match guard.as_mut() {
                Some(batch) => {
                    batch.depth += 1;
                    false
                }
                None => {
                    *guard = Some(BatchContext {
                        depth: 1,
                        deferred: Vec::new(),
                    });
                    true
                }
            }
        });
        Self {
            is_root,
            closed: false,
        }
    }

    /// Number of deferred notifications queued in the current batch.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        BATCH_CTX.with(|ctx| ctx.borrow().as_ref().map_or(0, |b| b.deferred.len()))
    }

    /// Whether this scope will flush when it closes.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Close the scope. The outermost scope flushes and reports the first
    /// reaction error; inner scopes always return `Ok(())`.
    pub fn commit(mut self) -> Result<(), ReactionError> {
        self.close()
    }

    fn close(&mut self) -> Result<(), ReactionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let deferred = BATCH_CTX.with(|ctx| {
            let mut guard = ctx.borrow_mut();
            let batch = guard.as_mut()?;
            batch.depth = batch.depth.saturating_sub(1);
            if batch.depth > 0 {
                return None;
            }
            guard.take().map(|batch| batch.deferred)
        });
        match deferred {
            Some(deferred) => flush(deferred),
            None => Ok(()),
        }
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(
                target: "navsync.reactive",
                error = %err,
                "reaction failed while flushing a dropped batch"
            );
        }
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope")
            .field("is_root", &self.is_root)
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Run `f` inside a batch so every write it performs produces at most one
/// notification per callback.
///
/// When `f` fails, the writes it already made are still flushed (observers
/// must not be left on stale values) and `f`'s error wins. Otherwise the
/// first reaction error of the flush is returned.
pub fn run_atomically<R, E>(f: impl FnOnce() -> Result<R, E>) -> Result<R, E>
where
    E: From<ReactionError>,
{
    let scope = BatchScope::new();
    match f() {
        Ok(value) => {
            scope.commit()?;
            Ok(value)
        }
        Err(err) => {
            drop(scope);
            Err(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
