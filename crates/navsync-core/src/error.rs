#![forbid(unsafe_code)]

//! Error types for the synchronization engine.

use navsync_backend::{BackendError, ListenerError};
use navsync_reactive::ReactionError;

/// A location string or field that cannot be represented canonically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    /// The input contains an ASCII or Unicode control character.
    #[error("control character at byte {position} in {input:?}")]
    ControlCharacter { input: String, position: usize },
    /// The input carries a scheme or authority; only relative locations are
    /// accepted.
    #[error("absolute URL {0:?} is not a relative location")]
    AbsoluteUrl(String),
    /// A path field contains `?` or `#`.
    #[error("path {0:?} contains a query or fragment delimiter")]
    PathDelimiter(String),
    /// A query field contains `#`.
    #[error("query {0:?} contains a fragment delimiter")]
    QueryDelimiter(String),
}

/// Top-level error of the synchronization engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A location could not be parsed or canonicalized.
    #[error("malformed location: {0}")]
    MalformedInput(#[from] LocationError),
    /// The navigation backend reported a failure.
    #[error("backend error: {0}")]
    Backend(#[source] BackendError),
    /// A reaction failed with an error that is not a [`SyncError`].
    #[error("reaction failed: {0}")]
    Reaction(#[source] ReactionError),
    /// The configuration did not pass validation.
    #[error("invalid configuration: {}", .0.join("; "))]
    Config(Vec<String>),
}

impl SyncError {
    /// Short label for metrics and log fields.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::Backend(_) => "backend",
            Self::Reaction(_) => "reaction",
            Self::Config(_) => "config",
        }
    }

    /// Whether this error was caused by caller-supplied input.
    #[must_use]
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Self::MalformedInput(_))
    }
}

// Reactions and listeners box their errors. A `SyncError` raised deep inside
// the chain is unwrapped back to its own variant on the way out.

impl From<ReactionError> for SyncError {
    fn from(err: ReactionError) -> Self {
        match err.downcast::<SyncError>() {
            Ok(sync) => sync,
            Err(err) => Self::Reaction(err),
        }
    }
}

impl From<ListenerError> for SyncError {
    fn from(err: ListenerError) -> Self {
        match err.downcast::<SyncError>() {
            Ok(sync) => sync,
            Err(err) => match err.downcast::<ReactionError>() {
                Ok(reaction) => reaction.into(),
                Err(err) => Self::Backend(BackendError::Listener(err)),
            },
        }
    }
}

impl From<BackendError> for SyncError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Listener(listener) => listener.into(),
        }
    }
}

/// Standard result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
