#![forbid(unsafe_code)]

//! Error type carried out of fallible reactions.

use std::error::Error as StdError;
use std::fmt;

/// Failure raised by a reaction registered with
/// [`Observable::react`](crate::Observable::react).
///
/// The error boxes whatever the reaction produced so the substrate stays
/// agnostic of its callers' error types. Callers that know what their
/// reactions return recover the concrete type with [`ReactionError::downcast`].
pub struct ReactionError {
    inner: Box<dyn StdError + 'static>,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

impl ReactionError {
    /// Wrap a concrete error.
    pub fn new(error: impl StdError + 'static) -> Self {
        Self {
            inner: Box::new(error),
        }
    }

    /// Build an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Recover the concrete error, or give `self` back when the type differs.
    pub fn downcast<E: StdError + 'static>(self) -> Result<E, Self> {
        match self.inner.downcast::<E>() {
            Ok(concrete) => Ok(*concrete),
            Err(inner) => Err(Self { inner }),
        }
    }

    /// Borrow the concrete error if it has type `E`.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}

impl fmt::Debug for ReactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReactionError").field(&self.inner).finish()
    }
}

impl fmt::Display for ReactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for ReactionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("bad path {0}")]
    struct BadPath(String);

    #[test]
    fn downcast_recovers_concrete_error() {
        let err = ReactionError::new(BadPath("/x".into()));
        assert_eq!(err.to_string(), "bad path /x");
        assert_eq!(err.downcast::<BadPath>().unwrap(), BadPath("/x".into()));
    }

    #[test]
    fn downcast_to_wrong_type_returns_original() {
        let err = ReactionError::msg("boom");
        let err = err.downcast::<BadPath>().unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(err.downcast_ref::<BadPath>().is_none());
    }
}
