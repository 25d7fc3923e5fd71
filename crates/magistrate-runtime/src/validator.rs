//! The validation pipeline front door.
//!
//! A [`Validator`] owns the long-lived pieces (the defaults registry and
//! the backend resolver) and runs each check through the fixed sequence:
//! merge options, resolve the backend, execute under the deadline, parse
//! the reply, gate it into a [`Verdict`]. Per-call state never outlives
//! the call.
//!
//! Deadline expiry and caller cancellation are expected outcomes, not
//! faults: both come back as failed verdicts with an explanatory
//! message. Everything else (a bad request, an unknown backend, a
//! malformed reply, a transport failure) is an error, since an
//! unattended caller cannot act on it.

use std::sync::Arc;

use thiserror::Error;

use magistrate_core::{
    BackendDefaults, CheckOptions, DefaultsRegistry, InvalidRequest, Reply, ReplyError,
    ResolvedOptions, Verdict,
};

use crate::backend::{Backend, BackendError};
use crate::cancel::CancelHandle;
use crate::executor;
use crate::resolver::{BackendDirectory, BackendResolver, UnknownBackend};

/// Errors from the validation pipeline.
///
/// `Timeout` and `Cancelled` never appear here; they are recovered into
/// failed verdicts before this type is built.
#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] InvalidRequest),

    #[error(transparent)]
    Resolution(#[from] UnknownBackend),

    #[error("Backend reply violated the reply contract: {0}")]
    MalformedReply(#[from] ReplyError),

    #[error("Backend call failed: {0}")]
    Backend(#[source] BackendError),
}

/// Executes validation checks end to end.
///
/// Build one with [`Validator::builder`], register backends and their
/// defaults once at startup, then share it: checks take `&self` and can
/// run concurrently.
pub struct Validator {
    defaults: DefaultsRegistry,
    resolver: Arc<dyn BackendResolver>,
}

impl Validator {
    /// Start building a validator.
    pub fn builder() -> ValidatorBuilder {
        ValidatorBuilder::new()
    }

    /// Ask whether `subject` satisfies the instructions in `options`.
    pub async fn check(
        &self,
        options: &CheckOptions,
        subject: &str,
    ) -> Result<Verdict, ValidateError> {
        self.run(options, subject, None).await
    }

    /// Like [`check`](Validator::check), but interruptible through the
    /// given handle; cancellation yields a failed verdict.
    pub async fn check_with_cancel(
        &self,
        options: &CheckOptions,
        subject: &str,
        cancel: &CancelHandle,
    ) -> Result<Verdict, ValidateError> {
        self.run(options, subject, Some(cancel)).await
    }

    async fn run(
        &self,
        options: &CheckOptions,
        subject: &str,
        cancel: Option<&CancelHandle>,
    ) -> Result<Verdict, ValidateError> {
        let defaults = self.defaults.lookup(&options.backend);
        let resolved = ResolvedOptions::merge(options, defaults)?;
        let backend = self.resolver.resolve(&resolved.backend)?;

        let raw = match executor::execute(&resolved, subject, backend.as_ref(), cancel).await {
            Ok(raw) => raw,
            Err(BackendError::Timeout(deadline)) => {
                return Ok(Verdict::timed_out(&resolved.backend, deadline))
            }
            Err(BackendError::Cancelled) => return Ok(Verdict::cancelled(&resolved.backend)),
            Err(error) => {
                tracing::error!(backend = backend.name(), %error, "Backend call failed");
                return Err(ValidateError::Backend(error));
            }
        };

        let reply = Reply::parse(&raw).map_err(|error| {
            tracing::error!(backend = backend.name(), %error, "Malformed backend reply");
            error
        })?;

        let verdict = Verdict::from_reply(reply, raw, &resolved);
        tracing::debug!(
            backend = backend.name(),
            pass = verdict.pass,
            "Check complete"
        );
        Ok(verdict)
    }

    /// The defaults registry, for inspection.
    pub fn defaults(&self) -> &DefaultsRegistry {
        &self.defaults
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// Builder for [`Validator`].
#[derive(Default)]
pub struct ValidatorBuilder {
    defaults: DefaultsRegistry,
    directory: BackendDirectory,
    resolver: Option<Arc<dyn BackendResolver>>,
}

impl ValidatorBuilder {
    /// New builder with stock defaults and no backends.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register baseline options under a backend name. The empty name
    /// replaces the fallback entry used by unregistered names.
    pub fn defaults(mut self, name: impl Into<String>, defaults: BackendDefaults) -> Self {
        self.defaults.register(name, defaults);
        self
    }

    /// Register a backend handle under a name.
    pub fn backend(mut self, name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.directory.register(name, backend);
        self
    }

    /// Set the handle answering checks that name no backend.
    pub fn default_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.directory.register_default(backend);
        self
    }

    /// Replace the resolution strategy wholesale. Handles registered on
    /// the built-in directory are ignored once a custom resolver is set.
    pub fn resolver(mut self, resolver: Arc<dyn BackendResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Build the validator.
    pub fn build(self) -> Validator {
        let Self {
            defaults,
            directory,
            resolver,
        } = self;

        let resolver: Arc<dyn BackendResolver> = match resolver {
            Some(resolver) => resolver,
            None => Arc::new(directory),
        };

        Validator { defaults, resolver }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use magistrate_core::GENERIC_FAILURE;
    use serde_json::json;

    use crate::backend::BackendRequest;

    /// Replies with a fixed body and records what it was asked.
    struct ScriptedBackend {
        name: &'static str,
        body: &'static str,
        seen: Mutex<Vec<BackendRequest>>,
    }

    impl ScriptedBackend {
        fn new(name: &'static str, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                body,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn invoke(&self, request: BackendRequest) -> Result<String, BackendError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.body.to_string())
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    struct StallingBackend;

    #[async_trait]
    impl Backend for StallingBackend {
        async fn invoke(&self, _request: BackendRequest) -> Result<String, BackendError> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "stalling"
        }
    }

    fn validator_with_default(backend: Arc<dyn Backend>) -> Validator {
        Validator::builder().default_backend(backend).build()
    }

    #[tokio::test]
    async fn test_passing_check_end_to_end() {
        let backend = ScriptedBackend::new("mock", r#"{"verdict": true, "reason": null}"#);
        let validator = validator_with_default(backend);

        let verdict = validator
            .check(
                &CheckOptions::new("The text must be about dogs"),
                "Golden Retrievers are friendly dogs",
            )
            .await
            .unwrap();

        assert!(verdict.pass);
        assert!(verdict.raw.is_some());
    }

    #[tokio::test]
    async fn test_failing_check_reports_backend_reason() {
        let backend = ScriptedBackend::new(
            "mock",
            r#"{"verdict": false, "reason": "text is about cats, not dogs"}"#,
        );
        let validator = validator_with_default(backend);

        let verdict = validator
            .check(
                &CheckOptions::new("The text must be about dogs"),
                "Persian cats have long fur",
            )
            .await
            .unwrap();

        assert!(!verdict.pass);
        assert_eq!(
            verdict.message.as_deref(),
            Some("text is about cats, not dogs")
        );
    }

    #[tokio::test]
    async fn test_failing_check_prefers_custom_message() {
        let backend = ScriptedBackend::new("mock", r#"{"verdict": false, "reason": "off topic"}"#);
        let validator = validator_with_default(backend);

        let options = CheckOptions::new("The text must be about dogs")
            .with_failure_message("Must mention dogs");
        let verdict = validator
            .check(&options, "Persian cats have long fur")
            .await
            .unwrap();

        assert!(!verdict.pass);
        assert_eq!(verdict.message.as_deref(), Some("Must mention dogs"));
    }

    #[tokio::test]
    async fn test_failing_check_without_reason_uses_generic_message() {
        let backend = ScriptedBackend::new("mock", r#"{"verdict": false}"#);
        let validator = validator_with_default(backend);

        let verdict = validator
            .check(&CheckOptions::new("The text must be about dogs"), "meow")
            .await
            .unwrap();

        assert_eq!(verdict.message.as_deref(), Some(GENERIC_FAILURE));
    }

    #[tokio::test]
    async fn test_confidence_gate_applies_through_the_pipeline() {
        let backend = ScriptedBackend::new("mock", r#"{"verdict": true, "confidence": 0.40}"#);
        let validator = validator_with_default(backend);

        let options = CheckOptions::new("about dogs").with_confidence_floor(0.60);
        let verdict = validator.check(&options, "woof").await.unwrap();
        assert!(!verdict.pass);

        let options = CheckOptions::new("about dogs").with_confidence_floor(0.30);
        let verdict = validator.check(&options, "woof").await.unwrap();
        assert!(verdict.pass);
    }

    #[tokio::test]
    async fn test_empty_instructions_is_invalid_request() {
        let backend = ScriptedBackend::new("mock", r#"{"verdict": true}"#);
        let validator = validator_with_default(backend.clone());

        let err = validator
            .check(&CheckOptions::new("   "), "anything")
            .await
            .unwrap_err();

        assert!(matches!(err, ValidateError::InvalidRequest(_)));
        // Rejected before any backend work.
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_backend_is_resolution_error() {
        let backend = ScriptedBackend::new("mock", r#"{"verdict": true}"#);
        let validator = Validator::builder().backend("fast", backend).build();

        let options = CheckOptions::new("about dogs").with_backend("accurate");
        let err = validator.check(&options, "woof").await.unwrap_err();

        match err {
            ValidateError::Resolution(unknown) => {
                assert_eq!(unknown.name, "accurate");
                assert_eq!(unknown.available, vec!["fast".to_string()]);
            }
            other => panic!("expected Resolution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_backend_name_uses_default_handle() {
        let backend = ScriptedBackend::new("mock", r#"{"verdict": true}"#);
        let validator = validator_with_default(backend.clone());

        let verdict = validator
            .check(&CheckOptions::new("about dogs"), "woof")
            .await
            .unwrap();

        assert!(verdict.pass);
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_its_own_error() {
        let backend = ScriptedBackend::new("mock", "the text looks fine to me!");
        let validator = validator_with_default(backend);

        let err = validator
            .check(&CheckOptions::new("about dogs"), "woof")
            .await
            .unwrap_err();

        assert!(matches!(err, ValidateError::MalformedReply(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates_as_backend_error() {
        struct FailingBackend;

        #[async_trait]
        impl Backend for FailingBackend {
            async fn invoke(&self, _request: BackendRequest) -> Result<String, BackendError> {
                Err(BackendError::Http("connection refused".to_string()))
            }

            fn name(&self) -> &str {
                "failing"
            }
        }

        let validator = validator_with_default(Arc::new(FailingBackend));
        let err = validator
            .check(&CheckOptions::new("about dogs"), "woof")
            .await
            .unwrap_err();

        assert!(matches!(err, ValidateError::Backend(BackendError::Http(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_is_a_failed_verdict() {
        let validator = validator_with_default(Arc::new(StallingBackend));

        let options = CheckOptions::new("about dogs").with_timeout(Duration::from_secs(2));
        let verdict = validator.check(&options, "woof").await.unwrap();

        assert!(!verdict.pass);
        assert_eq!(verdict.raw, None);
        assert!(verdict.message.unwrap().contains("did not reply within 2s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_a_failed_verdict() {
        let validator = validator_with_default(Arc::new(StallingBackend));
        let cancel = CancelHandle::new();

        let options = CheckOptions::new("about dogs").with_timeout(Duration::from_secs(3600));
        let check = validator.check_with_cancel(&options, "woof", &cancel);
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel.cancel();
        };

        let (verdict, ()) = tokio::join!(check, canceller);
        let verdict = verdict.unwrap();

        assert!(!verdict.pass);
        assert_eq!(verdict.raw, None);
        assert!(verdict.message.unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_caller_options_are_reusable_after_a_check() {
        let backend = ScriptedBackend::new("mock", r#"{"verdict": true}"#);
        let validator = validator_with_default(backend);

        let options = CheckOptions::new("about dogs").with_max_tokens(99);
        let first = validator.check(&options, "woof").await.unwrap();
        let second = validator.check(&options, "woof").await.unwrap();

        assert!(first.pass && second.pass);
        assert_eq!(options.max_tokens, Some(99));
    }

    #[tokio::test]
    async fn test_per_backend_defaults_shape_the_request() {
        let fast = ScriptedBackend::new("fast", r#"{"verdict": true}"#);
        let validator = Validator::builder()
            .defaults(
                "fast",
                BackendDefaults::default()
                    .with_preamble("answer quickly")
                    .with_max_tokens(64)
                    .with_metadata("tier", json!("cheap")),
            )
            .backend("fast", fast.clone())
            .build();

        assert!(validator.defaults().has("fast"));

        let options = CheckOptions::new("about dogs").with_backend("fast");
        validator.check(&options, "woof").await.unwrap();

        let seen = fast.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.max_tokens, 64);
        assert_eq!(request.messages[0].content, "answer quickly");
        assert_eq!(request.metadata.get("tier"), Some(&json!("cheap")));
    }

    #[tokio::test]
    async fn test_custom_resolver_replaces_the_directory() {
        struct FixedResolver(Arc<dyn Backend>);

        impl BackendResolver for FixedResolver {
            fn resolve(&self, _name: &str) -> Result<Arc<dyn Backend>, UnknownBackend> {
                Ok(Arc::clone(&self.0))
            }
        }

        let backend = ScriptedBackend::new("fixed", r#"{"verdict": true}"#);
        let validator = Validator::builder()
            .resolver(Arc::new(FixedResolver(backend.clone())))
            .build();

        let options = CheckOptions::new("about dogs").with_backend("whatever");
        assert!(validator.check(&options, "woof").await.unwrap().pass);
    }
}
