#![forbid(unsafe_code)]

//! Synchronization engine for navsync.
//!
//! Three views of the current navigation point are kept in agreement:
//!
//! - the backend's log ([`NavigationBackend`](navsync_backend::NavigationBackend)),
//! - a field-addressable [`Location`],
//! - a multi-valued [`SearchParams`] view of the query.
//!
//! Every write to one of them is normalized, compared against what is
//! already there, and propagated to the others at most once. See
//! [`engine`] for the propagation rules.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use navsync_backend::MemoryHistory;
//! use navsync_core::{SyncConfig, SyncEngine};
//!
//! let engine = SyncEngine::new(Rc::new(MemoryHistory::default()), SyncConfig::default())?;
//! engine.location().set_path("/users")?;
//! engine.search_params().unwrap().set("page", "2")?;
//! assert_eq!(engine.backend().current_entry().href(), "/users?page=2");
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod location;
pub mod normalize;
pub mod search_params;
pub mod stats;

pub use config::{ConfigError, EncodeFn, Encoder, SyncConfig};
pub use engine::{ParamsSource, SyncEngine};
pub use error::{LocationError, Result, SyncError};
pub use location::Location;
pub use normalize::{
    LocationInput, LocationParts, Resolve, canonical_path, compose, compose_entry, normalize_affixed,
};
pub use search_params::{ParamValue, SearchParams, ToStringOptions};
pub use stats::SyncStats;
