//! # magistrate-runtime
//!
//! The asynchronous half of the Magistrate validation pipeline: the
//! [`Backend`] abstraction, name resolution, deadline-bounded execution,
//! and the [`Validator`] front door that ties them to the pure pieces in
//! `magistrate-core`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use magistrate_core::{BackendDefaults, CheckOptions};
//! use magistrate_runtime::{OpenAiBackend, Validator};
//!
//! let validator = Validator::builder()
//!     .defaults("fast", BackendDefaults::default().with_max_tokens(128))
//!     .backend("fast", Arc::new(OpenAiBackend::from_env("gpt-4o-mini")?))
//!     .default_backend(Arc::new(OpenAiBackend::from_env("gpt-4o")?))
//!     .build();
//!
//! let options = CheckOptions::new("The text must be about dogs");
//! let verdict = validator.check(&options, "Dogs are wonderful.").await?;
//! assert!(verdict.pass);
//! ```

pub mod backend;
pub mod backends;
pub mod cancel;
pub mod executor;
pub mod resolver;
pub mod validator;

// Re-export main types at crate root
pub use backend::{Backend, BackendError, BackendRequest, Message, Role};
pub use backends::{BackendKey, KeySource};
pub use cancel::CancelHandle;
pub use resolver::{BackendDirectory, BackendResolver, UnknownBackend};
pub use validator::{ValidateError, Validator, ValidatorBuilder};

#[cfg(feature = "openai")]
pub use backends::{OpenAiBackend, OPENAI_API_KEY_ENV};
