#![forbid(unsafe_code)]

//! Reactive substrate for navsync.
//!
//! # Role in navsync
//! `navsync-reactive` is the notification layer the synchronization engine
//! builds on. It knows nothing about locations or history; it only offers
//! four capabilities:
//!
//! - **make observable**: [`Observable::new`] wraps a value in shared,
//!   version-tracked storage.
//! - **on change**: [`Observable::subscribe`] and [`Observable::react`]
//!   register callbacks, returning RAII [`Subscription`] guards.
//! - **run atomically**: [`run_atomically`] and [`BatchScope`] coalesce
//!   several writes into one notification pass.
//! - **intercept write**: [`Observable::intercept`] rewrites or rejects a
//!   proposed value before it is stored.
//!
//! Everything is single-threaded (`Rc`/`RefCell`) and synchronous: a write
//! and all of its reactions complete before the write returns.

pub mod batch;
pub mod error;
pub mod observable;

pub use batch::{BatchScope, is_batching, run_atomically};
pub use error::ReactionError;
pub use observable::{Intercept, Observable, SharedReaction, Subscription};
