//! OpenAI-compatible chat completion backend.
//!
//! Works against api.openai.com and anything speaking the same
//! `/chat/completions` dialect (vLLM, LiteLLM, Ollama's OpenAI
//! endpoint). The structured-reply schema on the request is forwarded as
//! a `response_format` JSON-schema constraint, so conforming servers
//! return the reply shape even under the terse fast-fidelity prompts.
//!
//! The API key lives in a [`BackendKey`] and is revealed only where the
//! Authorization header is built.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::backend::{Backend, BackendError, BackendRequest, Message};
use crate::backends::key::BackendKey;

/// Environment variable name for the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Metadata entries with this prefix are copied into the request body
/// with the prefix stripped: `"openai.top_p": 0.9` becomes `"top_p": 0.9`.
pub const METADATA_PREFIX: &str = "openai.";

/// OpenAI-compatible backend.
#[derive(Debug)]
pub struct OpenAiBackend {
    name: String,
    model: String,
    base_url: String,
    key: BackendKey,
}

impl OpenAiBackend {
    /// Backend for `model` with an explicit API key.
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: "openai".to_string(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            key: BackendKey::inline(api_key, "OpenAI API key"),
        }
    }

    /// Backend for `model` with the key from `OPENAI_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self, BackendError> {
        let key = BackendKey::from_env(OPENAI_API_KEY_ENV, "OpenAI API key")?;
        Ok(Self {
            name: "openai".to_string(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            key,
        })
    }

    /// Point at a different OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the name reported in logs and verdict messages.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Model this backend sends requests for.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn http_client() -> &'static reqwest::Client {
        static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
        CLIENT.get_or_init(|| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client")
        })
    }

    /// Serialize the chat request, then splice in `openai.`-prefixed
    /// metadata entries as top-level body fields.
    fn request_body(&self, request: &BackendRequest) -> Result<JsonValue, BackendError> {
        let chat = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: ResponseFormat {
                type_: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "verdict_reply",
                    strict: true,
                    schema: Self::strict_schema(&request.schema),
                },
            },
        };

        let mut body =
            serde_json::to_value(&chat).map_err(|e| BackendError::Parse(e.to_string()))?;

        if let Some(object) = body.as_object_mut() {
            for (key, value) in &request.metadata {
                if let Some(field) = key.strip_prefix(METADATA_PREFIX) {
                    object.insert(field.to_string(), value.clone());
                }
            }
        }

        Ok(body)
    }

    /// Rewrite the schema hint into the shape strict mode accepts.
    ///
    /// Strict structured outputs reject any schema whose `required` list
    /// omits a property; optional fields must be expressed as nullable
    /// types instead. The hint's `reason` and `confidence` are already
    /// nullable, so listing every property changes nothing for parsing.
    fn strict_schema(hint: &JsonValue) -> JsonValue {
        let mut schema = hint.clone();
        let property_names: Option<Vec<JsonValue>> = schema
            .get("properties")
            .and_then(JsonValue::as_object)
            .map(|properties| properties.keys().cloned().map(JsonValue::String).collect());

        if let (Some(names), Some(object)) = (property_names, schema.as_object_mut()) {
            object.insert("required".to_string(), JsonValue::Array(names));
        }

        schema
    }

    /// Map a non-success response to the transport error taxonomy.
    async fn error_for(status: StatusCode, response: reqwest::Response) -> BackendError {
        match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|seconds| seconds.parse().ok())
                    .map(Duration::from_secs);
                BackendError::RateLimited { retry_after }
            }
            401 | 403 => BackendError::Auth,
            _ => {
                // Error bodies are best-effort; servers disagree on shape.
                let message = response
                    .json::<ApiErrorBody>()
                    .await
                    .map(|body| body.error.message)
                    .unwrap_or_else(|_| format!("HTTP {status}"));
                BackendError::Api {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }
}

/// OpenAI chat completion request format.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    type_: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    strict: bool,
    schema: JsonValue,
}

/// OpenAI chat completion response format.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn invoke(&self, request: BackendRequest) -> Result<String, BackendError> {
        let body = self.request_body(&request)?;

        // The key is revealed only here, to build the header.
        let response = Self::http_client()
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.key.reveal())
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    return BackendError::Timeout(request.timeout);
                }
                BackendError::Http(error.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_for(status, response).await);
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|error| BackendError::Parse(error.to_string()))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::Parse("No message content in response".to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
