//! Per-backend default option registry.

use std::collections::BTreeMap;
use std::fmt;

use crate::options::BackendDefaults;

/// Registry of [`BackendDefaults`] keyed by backend name.
///
/// A fallback entry always exists. It answers lookups for the empty
/// ("default backend") name and for names with no registered entry, so
/// [`lookup`](DefaultsRegistry::lookup) is total: a name nobody
/// registered defaults for still merges against sane baselines, and
/// whether the name maps to a real backend is decided later, at
/// resolution time.
///
/// Registration happens at startup; lookups afterwards take `&self`,
/// so a built registry can be shared freely across tasks.
#[derive(Clone, Default)]
pub struct DefaultsRegistry {
    entries: BTreeMap<String, BackendDefaults>,
    fallback: BackendDefaults,
}

impl DefaultsRegistry {
    /// Empty registry whose fallback is [`BackendDefaults::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace the defaults for a backend name.
    ///
    /// Registering under the empty name replaces the fallback entry
    /// itself.
    pub fn register(&mut self, name: impl Into<String>, defaults: BackendDefaults) {
        let name = name.into();
        if name.is_empty() {
            self.fallback = defaults;
        } else {
            self.entries.insert(name, defaults);
        }
    }

    /// Defaults for a backend name; never fails.
    ///
    /// The empty name and unregistered names both resolve to the
    /// fallback entry.
    pub fn lookup(&self, name: &str) -> &BackendDefaults {
        self.entries.get(name).unwrap_or(&self.fallback)
    }

    /// Whether defaults were explicitly registered under a name.
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names with explicitly registered defaults, sorted.
    pub fn registered(&self) -> Vec<&str> {
        self.entries.keys().map(|name| name.as_str()).collect()
    }
}

impl fmt::Debug for DefaultsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultsRegistry")
            .field("backends", &self.registered())
            .finish()
    }
}
