//! Built-in backend implementations.
//!
//! Only the OpenAI-compatible backend ships here, behind the `openai`
//! feature; everything else plugs in through the
//! [`Backend`](crate::backend::Backend) trait. The [`key`] module is
//! unconditional so custom backends can reuse the same leak-proof key
//! handling.

pub mod key;

#[cfg(feature = "openai")]
mod openai;

pub use key::{BackendKey, KeySource};

#[cfg(feature = "openai")]
pub use openai::{OpenAiBackend, METADATA_PREFIX, OPENAI_API_KEY_ENV};
