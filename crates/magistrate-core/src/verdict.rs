//! Final verdicts and the confidence gate.

use std::time::Duration;

use serde::Serialize;

use crate::options::ResolvedOptions;
use crate::reply::Reply;

/// Failure message of last resort, used when neither the caller nor the
/// backend supplied one.
pub const GENERIC_FAILURE: &str = "validation failed";

/// The final pass/fail answer for one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    /// Whether the subject passed the check.
    pub pass: bool,

    /// Human-readable explanation: the caller's failure message, the
    /// backend's reason, or a generic fallback.
    pub message: Option<String>,

    /// Raw backend reply, kept for diagnostics. `None` when the backend
    /// never answered (deadline expiry or cancellation).
    pub raw: Option<String>,
}

impl Verdict {
    /// Gate a decoded reply into the final verdict.
    ///
    /// When the resolved options carry a confidence floor and the reply
    /// carries a confidence below it, the verdict fails regardless of the
    /// reply's own boolean: an answer that was not trusted enough to act
    /// on is distinct from a negative answer, and the message says so. A
    /// reply without a confidence score is never gated.
    ///
    /// Otherwise the reply's boolean decides. A failing verdict reports
    /// the caller's failure message when one was resolved, then the
    /// backend's reason, then [`GENERIC_FAILURE`]. A passing verdict
    /// carries the backend's reason, if any.
    pub fn from_reply(reply: Reply, raw: impl Into<String>, options: &ResolvedOptions) -> Self {
        let raw = Some(raw.into());

        if let (Some(floor), Some(confidence)) = (options.confidence_floor, reply.confidence) {
            if confidence < floor {
                tracing::warn!(
                    confidence = %confidence,
                    floor = %floor,
                    "Reply confidence below floor, failing the verdict"
                );
                return Self {
                    pass: false,
                    message: Some(format!(
                        "backend confidence {confidence:.2} is below the required {floor:.2}"
                    )),
                    raw,
                };
            }
        }

        if reply.verdict {
            Self {
                pass: true,
                message: reply.reason,
                raw,
            }
        } else {
            let message = options
                .failure_message
                .clone()
                .or(reply.reason)
                .unwrap_or_else(|| GENERIC_FAILURE.to_string());
            Self {
                pass: false,
                message: Some(message),
                raw,
            }
        }
    }

    /// Failed verdict for a backend that missed its deadline.
    pub fn timed_out(backend: &str, deadline: Duration) -> Self {
        Self {
            pass: false,
            message: Some(format!(
                "backend '{}' did not reply within {}",
                display_name(backend),
                humantime::format_duration(deadline)
            )),
            raw: None,
        }
    }

    /// Failed verdict for a check cancelled by the caller.
    pub fn cancelled(backend: &str) -> Self {
        Self {
            pass: false,
            message: Some(format!(
                "check against backend '{}' was cancelled",
                display_name(backend)
            )),
            raw: None,
        }
    }
}

fn display_name(backend: &str) -> &str {
    if backend.is_empty() {
        "default"
    } else {
        backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{BackendDefaults, CheckOptions, ResolvedOptions};

    fn resolved(call: CheckOptions) -> ResolvedOptions {
        ResolvedOptions::merge(&call, &BackendDefaults::default()).unwrap()
    }

    fn reply(verdict: bool, reason: Option<&str>, confidence: Option<f32>) -> Reply {
        Reply {
            verdict,
            reason: reason.map(str::to_string),
            confidence,
        }
    }

    #[test]
    fn test_positive_reply_passes() {
        let options = resolved(CheckOptions::new("about dogs"));
        let verdict = Verdict::from_reply(reply(true, None, None), "{}", &options);

        assert!(verdict.pass);
        assert_eq!(verdict.message, None);
        assert_eq!(verdict.raw.as_deref(), Some("{}"));
    }

    #[test]
    fn test_passing_verdict_keeps_backend_reason() {
        let options = resolved(CheckOptions::new("about dogs"));
        let verdict = Verdict::from_reply(reply(true, Some("clearly about dogs"), None), "{}", &options);

        assert!(verdict.pass);
        assert_eq!(verdict.message.as_deref(), Some("clearly about dogs"));
    }

    #[test]
    fn test_failing_verdict_prefers_caller_message() {
        let options = resolved(CheckOptions::new("about dogs").with_failure_message("needs more dogs"));
        let verdict = Verdict::from_reply(reply(false, Some("about cats"), None), "{}", &options);

        assert!(!verdict.pass);
        assert_eq!(verdict.message.as_deref(), Some("needs more dogs"));
    }

    #[test]
    fn test_failing_verdict_falls_back_to_backend_reason() {
        let options = resolved(CheckOptions::new("about dogs"));
        let verdict = Verdict::from_reply(reply(false, Some("about cats"), None), "{}", &options);

        assert_eq!(verdict.message.as_deref(), Some("about cats"));
    }

    #[test]
    fn test_failing_verdict_falls_back_to_generic_message() {
        let options = resolved(CheckOptions::new("about dogs"));
        let verdict = Verdict::from_reply(reply(false, None, None), "{}", &options);

        assert_eq!(verdict.message.as_deref(), Some(GENERIC_FAILURE));
    }

    #[test]
    fn test_confidence_below_floor_fails_even_a_positive_reply() {
        let options = resolved(CheckOptions::new("about dogs").with_confidence_floor(0.60));
        let verdict = Verdict::from_reply(reply(true, None, Some(0.40)), "{}", &options);

        assert!(!verdict.pass);
        let message = verdict.message.unwrap();
        assert!(message.contains("0.40"));
        assert!(message.contains("0.60"));
    }

    #[test]
    fn test_confidence_at_or_above_floor_is_not_gated() {
        let options = resolved(CheckOptions::new("about dogs").with_confidence_floor(0.30));
        let verdict = Verdict::from_reply(reply(true, None, Some(0.40)), "{}", &options);
        assert!(verdict.pass);

        // Exactly at the floor counts as trusted.
        let options = resolved(CheckOptions::new("about dogs").with_confidence_floor(0.40));
        let verdict = Verdict::from_reply(reply(true, None, Some(0.40)), "{}", &options);
        assert!(verdict.pass);
    }

    #[test]
    fn test_reply_without_confidence_is_never_gated() {
        let options = resolved(CheckOptions::new("about dogs").with_confidence_floor(0.99));
        let verdict = Verdict::from_reply(reply(true, None, None), "{}", &options);
        assert!(verdict.pass);
    }

    #[test]
    fn test_no_floor_means_no_gate() {
        let options = resolved(CheckOptions::new("about dogs"));
        let verdict = Verdict::from_reply(reply(true, None, Some(0.01)), "{}", &options);
        assert!(verdict.pass);
    }

    #[test]
    fn test_timed_out_verdict_names_backend_and_deadline() {
        let verdict = Verdict::timed_out("accurate", Duration::from_secs(30));

        assert!(!verdict.pass);
        assert_eq!(verdict.raw, None);
        let message = verdict.message.unwrap();
        assert!(message.contains("accurate"));
        assert!(message.contains("30s"));
    }

    #[test]
    fn test_cancelled_verdict_for_default_backend() {
        let verdict = Verdict::cancelled("");

        assert!(!verdict.pass);
        assert_eq!(verdict.raw, None);
        assert!(verdict.message.unwrap().contains("'default'"));
    }
}
