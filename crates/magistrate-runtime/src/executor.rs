//! Request assembly and execution under a deadline.
//!
//! The executor is the only place where a backend is actually invoked.
//! It turns [`ResolvedOptions`] plus the subject text into one
//! [`BackendRequest`], then races the invocation against the resolved
//! deadline and the caller's optional cancellation signal. Whichever
//! fires first wins; losers surface as [`BackendError::Timeout`] and
//! [`BackendError::Cancelled`], never as leaked timer or channel types.

use futures::future::{self, Either};
use futures::pin_mut;

use magistrate_core::{Reply, ResolvedOptions};

use crate::backend::{Backend, BackendError, BackendRequest, Message, Role};
use crate::cancel::{CancelHandle, CancelWatch};

/// Assemble the ordered message list for one check.
///
/// Order is fixed: the backend-default preamble (when non-empty), the
/// caller's preamble override (when non-empty and distinct from the
/// default), one message carrying the instruction text, and one carrying
/// the literal subject. The subject is never rewritten or truncated
/// here; over-length handling belongs to the backend.
pub fn assemble_messages(options: &ResolvedOptions, subject: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(4);

    if !options.preamble.is_empty() {
        messages.push(Message::new(Role::System, options.preamble.clone()));
    }
    if let Some(preamble_override) = &options.preamble_override {
        if !preamble_override.is_empty() && *preamble_override != options.preamble {
            messages.push(Message::new(Role::System, preamble_override.clone()));
        }
    }

    messages.push(Message::new(Role::User, options.instructions.clone()));
    messages.push(Message::new(Role::User, subject));

    messages
}

/// Build the full backend request for one check.
///
/// Alongside the messages this carries the generation hints, the
/// structured-reply schema, the metadata pass-through, and the deadline.
pub fn assemble_request(options: &ResolvedOptions, subject: &str) -> BackendRequest {
    BackendRequest {
        messages: assemble_messages(options, subject),
        max_tokens: options.max_tokens,
        temperature: options.temperature,
        schema: Reply::json_schema(),
        metadata: options.metadata.clone(),
        timeout: options.timeout,
    }
}

/// Execute one resolved check against a backend.
///
/// Returns the raw reply text, or the error the race produced. The
/// deadline always comes from the resolved options; `None` for `cancel`
/// means only the deadline can interrupt the call.
pub async fn execute(
    options: &ResolvedOptions,
    subject: &str,
    backend: &dyn Backend,
    cancel: Option<&CancelHandle>,
) -> Result<String, BackendError> {
    let request = assemble_request(options, subject);

    tracing::debug!(
        backend = backend.name(),
        messages = request.messages.len(),
        subject_len = subject.len(),
        timeout = ?options.timeout,
        "Invoking backend"
    );

    let watch = match cancel {
        Some(handle) => handle.watch(),
        None => CancelWatch::never(),
    };

    let invoke = tokio::time::timeout(options.timeout, backend.invoke(request));
    pin_mut!(invoke);
    let cancelled = watch.cancelled();
    pin_mut!(cancelled);

    match future::select(invoke, cancelled).await {
        Either::Left((Ok(outcome), _)) => outcome,
        Either::Left((Err(_elapsed), _)) => {
            tracing::warn!(
                backend = backend.name(),
                timeout = ?options.timeout,
                "Backend call timed out"
            );
            Err(BackendError::Timeout(options.timeout))
        }
        Either::Right(((), _)) => {
            tracing::warn!(backend = backend.name(), "Backend call cancelled by caller");
            Err(BackendError::Cancelled)
        }
    }
}
