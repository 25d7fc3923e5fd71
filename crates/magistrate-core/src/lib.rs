//! # magistrate-core
//!
//! Pure, synchronous pieces of the Magistrate validation pipeline.
//!
//! Magistrate answers one question: does this text satisfy property P?
//! The caller states the property in natural language, a text-generation
//! backend plays judge, and the answer comes back as a structured
//! pass/fail [`Verdict`] instead of free-form prose.
//!
//! This crate holds everything that needs no I/O: the option data model
//! and merge engine, the per-backend defaults registry, the built-in
//! instruction templates, and the reply parser with its confidence gate.
//! The async half (backend traits, resolution, and execution) lives in
//! `magistrate-runtime`.
//!
//! ## Key Guarantees
//!
//! 1. **Pure**: Merging and parsing are deterministic and never mutate
//!    their inputs
//! 2. **No I/O**: Nothing here performs network or filesystem work
//! 3. **Strict parsing**: A malformed backend reply is an error, never a
//!    guessed pass or fail
//! 4. **Total lookups**: Every backend name merges against usable
//!    defaults
//!
//! ## Example
//!
//! ```rust
//! use magistrate_core::{BackendDefaults, CheckOptions, ResolvedOptions};
//! use std::time::Duration;
//!
//! let call = CheckOptions::new("The text must be about dogs")
//!     .with_timeout(Duration::from_secs(5));
//!
//! let resolved = ResolvedOptions::merge(&call, &BackendDefaults::default())?;
//! assert_eq!(resolved.timeout, Duration::from_secs(5));
//! # Ok::<(), magistrate_core::InvalidRequest>(())
//! ```

pub mod options;
pub mod registry;
pub mod reply;
pub mod templates;
pub mod verdict;

// Re-export main types at crate root
pub use options::{BackendDefaults, CheckOptions, InvalidRequest, Metadata, ResolvedOptions};
pub use registry::DefaultsRegistry;
pub use reply::{Reply, ReplyError};
pub use templates::{Fidelity, Template, UnknownFidelity, DEFAULT_PREAMBLE};
pub use verdict::{Verdict, GENERIC_FAILURE};
