//! Backend resolution: from a backend name to an invocable handle.
//!
//! Resolution is an explicit, injected dependency of the pipeline. The
//! built-in strategy is [`BackendDirectory`], a plain name-to-handle map
//! with a default slot; integrators can swap in anything else that
//! implements [`BackendResolver`] (environment-based routing, tiered
//! fast/accurate selection, per-tenant handles) without touching the
//! pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::backend::Backend;

/// Resolution failure: no handle is registered under the requested name.
///
/// Carries the requested name ("default" stands in for the empty name)
/// and the names that would have resolved, so the message tells the
/// caller both what was asked for and what exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No backend registered under '{name}'. Available: {available:?}")]
pub struct UnknownBackend {
    /// The name that failed to resolve.
    pub name: String,

    /// Names that were registered at the time of the lookup.
    pub available: Vec<String>,
}

impl UnknownBackend {
    /// Failure for `name`, with the registered names for the message.
    pub fn new(name: impl Into<String>, available: Vec<String>) -> Self {
        let name = name.into();
        let name = if name.is_empty() {
            "default".to_string()
        } else {
            name
        };
        Self { name, available }
    }
}

/// Maps a backend name to an invocable handle.
pub trait BackendResolver: Send + Sync {
    /// Resolve a backend name; the empty string selects the default
    /// handle.
    fn resolve(&self, name: &str) -> Result<Arc<dyn Backend>, UnknownBackend>;
}

/// The built-in resolver: a name-to-handle directory with a default slot.
///
/// Registration happens at startup and lookups take `&self`, so a built
/// directory can be shared across tasks behind an `Arc`.
#[derive(Default)]
pub struct BackendDirectory {
    named: BTreeMap<String, Arc<dyn Backend>>,
    default: Option<Arc<dyn Backend>>,
}

impl BackendDirectory {
    /// Empty directory with no default handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle under a name, replacing any existing entry.
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn Backend>) {
        self.named.insert(name.into(), backend);
    }

    /// Set the handle that answers unspecified-backend requests.
    pub fn register_default(&mut self, backend: Arc<dyn Backend>) {
        self.default = Some(backend);
    }

    /// Whether a default handle is set.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Names with registered handles, sorted.
    pub fn registered(&self) -> Vec<&str> {
        self.named.keys().map(|name| name.as_str()).collect()
    }

    fn available(&self) -> Vec<String> {
        self.named.keys().cloned().collect()
    }
}

impl BackendResolver for BackendDirectory {
    fn resolve(&self, name: &str) -> Result<Arc<dyn Backend>, UnknownBackend> {
        let handle = if name.is_empty() {
            self.default.clone()
        } else {
            self.named.get(name).cloned()
        };

        handle.ok_or_else(|| UnknownBackend::new(name, self.available()))
    }
}

impl fmt::Debug for BackendDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDirectory")
            .field("backends", &self.registered())
            .field("has_default", &self.default.is_some())
            .finish()
    }
}
