//! Call options, backend defaults, and the option merge engine.
//!
//! A validation request starts life as a sparse [`CheckOptions`]: only the
//! instruction text is mandatory, everything else is an optional override.
//! Before anything touches a backend the options are merged with the
//! [`BackendDefaults`] registered for the requested backend, producing one
//! fully-resolved [`ResolvedOptions`] that the rest of the pipeline treats
//! as immutable.
//!
//! ## Merge rules
//!
//! - A caller value always beats the default for the same field.
//! - A caller timeout of exactly zero counts as unset; zero is never a
//!   legal deadline.
//! - Metadata is the union of both maps, caller entries winning on key
//!   collision.
//! - Merging never mutates its inputs and owns all of its output, so the
//!   caller may reuse or mutate their `CheckOptions` afterwards without
//!   affecting an in-flight check.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::templates::{Fidelity, Template, DEFAULT_PREAMBLE};

/// Backend-specific pass-through entries.
///
/// Keys are namespaced by convention (`"openai.top_p"`); backends ignore
/// entries they do not recognize. A `BTreeMap` keeps iteration order
/// deterministic, which keeps assembled requests reproducible.
pub type Metadata = BTreeMap<String, JsonValue>;

/// A request rejected before any merge or backend work happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidRequest {
    #[error("Instruction text must not be empty or blank")]
    EmptyInstructions,
}

/// Caller-supplied configuration for one validation check.
///
/// Construct with [`CheckOptions::new`] and layer overrides with the
/// `with_*` builders. The empty `backend` string means "use the default
/// backend".
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOptions {
    /// The property to check, e.g. "The text must be about dogs".
    pub instructions: String,

    /// Backend answering this check; empty selects the default.
    pub backend: String,

    /// System preamble override, sent after the backend's own preamble.
    pub preamble: Option<String>,

    /// Maximum output length hint, in tokens.
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 for deterministic).
    pub temperature: Option<f32>,

    /// Minimum backend confidence required to accept a verdict, in [0, 1].
    pub confidence_floor: Option<f32>,

    /// Per-call deadline. `Duration::ZERO` counts as unset.
    pub timeout: Option<Duration>,

    /// Message reported on failure instead of the backend's reason.
    pub failure_message: Option<String>,

    /// Backend-specific pass-through entries; merged with the defaults,
    /// caller entries win on key collision.
    pub metadata: Metadata,
}

impl CheckOptions {
    /// Options carrying the given instruction text and no overrides.
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            backend: String::new(),
            preamble: None,
            max_tokens: None,
            temperature: None,
            confidence_floor: None,
            timeout: None,
            failure_message: None,
            metadata: Metadata::new(),
        }
    }

    /// Options whose instruction text comes from a built-in template.
    pub fn from_template(template: Template<'_>, fidelity: Fidelity) -> Self {
        Self::new(template.instructions(fidelity))
    }

    /// Select a named backend.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Override the system preamble.
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    /// Cap the output length, in tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Require a minimum backend confidence for verdicts to count.
    pub fn with_confidence_floor(mut self, floor: f32) -> Self {
        self.confidence_floor = Some(floor);
        self
    }

    /// Set the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Report this message on failure instead of the backend's reason.
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    /// Add one backend-specific pass-through entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Baseline configuration registered per backend name.
///
/// Same knobs as [`CheckOptions`] minus the instruction text, with every
/// baseline filled in. Serializable so defaults can live in config files;
/// missing fields fall back to [`BackendDefaults::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendDefaults {
    /// System preamble sent before any caller override. Empty disables
    /// the preamble message entirely.
    pub preamble: String,

    /// Default maximum output length, in tokens.
    pub max_tokens: u32,

    /// Default sampling temperature.
    pub temperature: f32,

    /// Default confidence floor; `None` disables the gate.
    pub confidence_floor: Option<f32>,

    /// Default per-call deadline.
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// Default failure message; `None` lets the backend's reason through.
    pub failure_message: Option<String>,

    /// Baseline pass-through entries; caller entries win on collision.
    pub metadata: Metadata,
}

impl Default for BackendDefaults {
    fn default() -> Self {
        Self {
            preamble: DEFAULT_PREAMBLE.to_string(),
            max_tokens: 400,
            temperature: 0.0,
            confidence_floor: None,
            timeout: Duration::from_secs(15),
            failure_message: None,
            metadata: Metadata::new(),
        }
    }
}

impl BackendDefaults {
    /// Replace the default preamble.
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Set the default output cap, in tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the default sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Gate verdicts below this confidence by default.
    pub fn with_confidence_floor(mut self, floor: f32) -> Self {
        self.confidence_floor = Some(floor);
        self
    }

    /// Set the default deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the default failure message.
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    /// Add one baseline pass-through entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Fully-resolved configuration for one check.
///
/// Produced by [`ResolvedOptions::merge`]. Owns all of its storage; later
/// mutation of the caller's [`CheckOptions`] cannot reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    /// The property to check.
    pub instructions: String,

    /// Requested backend name; empty selects the default handle.
    pub backend: String,

    /// Backend-default system preamble. Empty means no preamble message.
    pub preamble: String,

    /// Caller preamble override; sent after `preamble` when non-empty
    /// and distinct from it.
    pub preamble_override: Option<String>,

    /// Maximum output length hint, in tokens.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Minimum confidence below which a verdict is not trusted.
    pub confidence_floor: Option<f32>,

    /// Hard deadline for the backend call. Never zero.
    pub timeout: Duration,

    /// Caller- or default-supplied failure message, if any.
    pub failure_message: Option<String>,

    /// Union of caller and default metadata, caller entries first.
    pub metadata: Metadata,
}

impl ResolvedOptions {
    /// Merge caller options with backend defaults.
    ///
    /// The instruction text must be non-blank; it is validated before any
    /// merge work and passes through unchanged, as does the backend name.
    /// Each optional knob keeps the caller's value when present and falls
    /// back to the default otherwise, with two twists: a caller timeout of
    /// zero counts as unset, and both preamble values are kept so the
    /// executor can emit the default first and the override after it.
    pub fn merge(call: &CheckOptions, defaults: &BackendDefaults) -> Result<Self, InvalidRequest> {
        if call.instructions.trim().is_empty() {
            return Err(InvalidRequest::EmptyInstructions);
        }

        let mut metadata = call.metadata.clone();
        for (key, value) in &defaults.metadata {
            metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        let timeout = match call.timeout {
            Some(t) if !t.is_zero() => t,
            _ => defaults.timeout,
        };

        Ok(Self {
            instructions: call.instructions.clone(),
            backend: call.backend.clone(),
            preamble: defaults.preamble.clone(),
            preamble_override: call.preamble.clone(),
            max_tokens: call.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: call.temperature.unwrap_or(defaults.temperature),
            confidence_floor: call.confidence_floor.or(defaults.confidence_floor),
            timeout,
            failure_message: call
                .failure_message
                .clone()
                .or_else(|| defaults.failure_message.clone()),
            metadata,
        })
    }
}

/// Serde adapter storing [`Duration`] as a humantime string ("30s", "2m").
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
