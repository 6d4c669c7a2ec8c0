#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! [`SyncConfig`] is consumed once when an engine (or a standalone
//! [`SearchParams`](crate::SearchParams)) is built; it is never mutated
//! afterwards.
//!
//! # Loading
//!
//! ```toml
//! # navsync.toml
//! skip_empty_values = false
//! join_arrays = true
//! join_arrays_with = "|"
//! encoder = "raw"
//! ```
//!
//! ```rust,ignore
//! let config = SyncConfig::from_toml_file("navsync.toml")?;
//! let config = SyncConfig::from_json_str(r#"{"join_arrays": false}"#)?;
//! ```
//!
//! Missing keys keep their defaults. Custom encoders cannot be expressed in
//! a file; install them with [`SyncConfig::with_encoder`].

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Signature of a custom value encoder.
pub type EncodeFn = dyn Fn(&str) -> String;

/// How parameter names and values are encoded in the canonical query string.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoder {
    /// `application/x-www-form-urlencoded` percent-encoding.
    #[default]
    Percent,
    /// Identity: values are written verbatim.
    Raw,
    /// Caller-supplied function.
    #[serde(skip)]
    Custom(Rc<EncodeFn>),
}

impl Encoder {
    pub fn custom(f: impl Fn(&str) -> String + 'static) -> Self {
        Self::Custom(Rc::new(f))
    }

    #[must_use]
    pub fn encode(&self, value: &str) -> String {
        match self {
            Self::Percent => form_urlencoded::byte_serialize(value.as_bytes()).collect(),
            Self::Raw => value.to_owned(),
            Self::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent => f.write_str("Percent"),
            Self::Raw => f.write_str("Raw"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PartialEq for Encoder {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Percent, Self::Percent) | (Self::Raw, Self::Raw) => true,
            (Self::Custom(a), Self::Custom(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Query-parameter behaviour shared by the engine and its views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Drop parameters whose value is empty.
    pub skip_empty_values: bool,
    /// Store multiple values of one name as a single joined value.
    pub join_arrays: bool,
    /// Separator used when `join_arrays` is on.
    pub join_arrays_with: String,
    /// Encoder applied to names and values when rendering.
    pub encoder: Encoder,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            skip_empty_values: true,
            join_arrays: true,
            join_arrays_with: ",".to_owned(),
            encoder: Encoder::Percent,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn with_skip_empty_values(mut self, skip: bool) -> Self {
        self.skip_empty_values = skip;
        self
    }

    #[must_use]
    pub fn with_join_arrays(mut self, join: bool) -> Self {
        self.join_arrays = join;
        self
    }

    #[must_use]
    pub fn with_join_arrays_with(mut self, separator: impl Into<String>) -> Self {
        self.join_arrays_with = separator.into();
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Check that the configuration can produce a well-formed query string.
    ///
    /// Returns every problem found; an empty list means the config is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.join_arrays {
            if self.join_arrays_with.is_empty() {
                errors.push("join_arrays_with must not be empty when join_arrays is on".into());
            }
            for reserved in ['&', '=', '#'] {
                if self.join_arrays_with.contains(reserved) {
                    errors.push(format!(
                        "join_arrays_with must not contain {reserved:?}, got {:?}",
                        self.join_arrays_with
                    ));
                }
            }
        }
        errors
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Load from a TOML string.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }
}

/// Failure while loading a [`SyncConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[source] std::io::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[source] serde_json::Error),
    #[cfg(feature = "config-file")]
    #[error("invalid TOML config: {0}")]
    Toml(#[source] toml::de::Error),
}
