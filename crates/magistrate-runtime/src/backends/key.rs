//! API key handling for backends.
//!
//! Built-in backends hold their key in a [`BackendKey`] so the value
//! cannot wander into logs: Debug output redacts it, the backing store
//! zeroes it on drop, and reading it back is a visible
//! [`reveal`](BackendKey::reveal) call at the point of use.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

use crate::backend::BackendError;

/// Where a [`BackendKey`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Read from an environment variable.
    EnvVar,
    /// Passed in by the integrator.
    Inline,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::EnvVar => f.write_str("environment"),
            KeySource::Inline => f.write_str("inline"),
        }
    }
}

/// An API key that cannot leak through Debug output.
pub struct BackendKey {
    secret: SecretString,
    source: KeySource,
    label: &'static str,
}

impl BackendKey {
    /// Wrap a key the integrator supplied directly.
    ///
    /// `label` names the key in error and Debug output, e.g.
    /// "OpenAI API key".
    pub fn inline(value: impl Into<String>, label: &'static str) -> Self {
        Self {
            secret: SecretString::from(value.into()),
            source: KeySource::Inline,
            label,
        }
    }

    /// Read a key from an environment variable.
    pub fn from_env(var: &str, label: &'static str) -> Result<Self, BackendError> {
        match std::env::var(var) {
            Ok(value) => Ok(Self {
                secret: SecretString::from(value),
                source: KeySource::EnvVar,
                label,
            }),
            Err(_) => Err(BackendError::NotConfigured(format!(
                "{label} missing: set the '{var}' environment variable"
            ))),
        }
    }

    /// Read the key back, e.g. to build an Authorization header.
    ///
    /// Use the result immediately; storing it defeats the wrapper.
    pub fn reveal(&self) -> &str {
        self.secret.expose_secret()
    }

    /// Where the key came from.
    pub fn source(&self) -> KeySource {
        self.source
    }
}

impl fmt::Debug for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackendKey({} from {}, [REDACTED])", self.label, self.source)
    }
}
