//! Text-generation capability interface.
//!
//! Everything that produces model text sits behind [`TextGenerationCapability`].
//! Implementations return raw JSON response objects and raw stream events;
//! normalising those shapes into text is the job of
//! [`ResilientAdapter`](crate::adapter::ResilientAdapter).
//!
//! Implementations are picked at construction time:
//!
//! | Implementation          | Where                          | `is_available` |
//! |-------------------------|--------------------------------|----------------|
//! | `OpenAiResponses`       | `courtroom-agents`             | key configured |
//! | [`DisabledCapability`]  | here                           | never          |

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw event stream produced by an open streaming call.
pub type RawEventStream = BoxStream<'static, Result<Value, CapabilityError>>;

/// Failure reported by a capability call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// The capability is not configured or not installed.
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// The backend refused one of the supplied options.
    #[error("option rejected: {0}")]
    OptionRejected(String),

    /// Transport or server-side failure.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The backend answered with something that could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The capability has no incremental mode.
    #[error("streaming not supported by this capability")]
    StreamingUnsupported,
}

impl CapabilityError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Per-call generation options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Maximum output length hint. Some backends reject it outright.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Copy of these options with the max-length hint removed.
    pub fn without_max_output_tokens(&self) -> Self {
        Self {
            max_output_tokens: None,
            ..self.clone()
        }
    }

    /// Whether no option is set.
    pub fn is_empty(&self) -> bool {
        self.max_output_tokens.is_none() && self.temperature.is_none()
    }
}

/// A single external text-generation backend.
#[async_trait]
pub trait TextGenerationCapability: Send + Sync {
    /// Backend name for logging (e.g. `"openai-responses"`).
    fn name(&self) -> &str;

    /// Whether the backend is configured at all. `false` routes every phase
    /// to mock text without attempting a call.
    fn is_available(&self) -> bool {
        true
    }

    /// One-shot completion returning the raw response object.
    async fn create(
        &self,
        model: &str,
        prompt: &str,
        options: &CallOptions,
    ) -> Result<Value, CapabilityError>;

    /// Open an incremental call yielding raw events.
    async fn open_stream(
        &self,
        _model: &str,
        _prompt: &str,
        _options: &CallOptions,
    ) -> Result<RawEventStream, CapabilityError> {
        Err(CapabilityError::StreamingUnsupported)
    }

    /// Model identifiers the backend can serve.
    async fn list_models(&self) -> Result<Vec<String>, CapabilityError> {
        Err(CapabilityError::Unavailable(format!(
            "{} cannot list models",
            self.name()
        )))
    }
}

/// Capability used when nothing is configured. Every call reports
/// [`CapabilityError::Unavailable`].
#[derive(Debug, Clone)]
pub struct DisabledCapability {
    reason: String,
}

impl DisabledCapability {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Default for DisabledCapability {
    fn default() -> Self {
        Self::new("no text-generation capability configured")
    }
}

#[async_trait]
impl TextGenerationCapability for DisabledCapability {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn create(
        &self,
        _model: &str,
        _prompt: &str,
        _options: &CallOptions,
    ) -> Result<Value, CapabilityError> {
        Err(CapabilityError::Unavailable(self.reason.clone()))
    }

    async fn open_stream(
        &self,
        _model: &str,
        _prompt: &str,
        _options: &CallOptions,
    ) -> Result<RawEventStream, CapabilityError> {
        Err(CapabilityError::Unavailable(self.reason.clone()))
    }

    async fn list_models(&self) -> Result<Vec<String>, CapabilityError> {
        Err(CapabilityError::Unavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_options_builder() {
        let opts = CallOptions::new()
            .with_max_output_tokens(300)
            .with_temperature(0.2);
        assert_eq!(opts.max_output_tokens, Some(300));
        assert!(!opts.is_empty());

        let reduced = opts.without_max_output_tokens();
        assert_eq!(reduced.max_output_tokens, None);
        assert_eq!(reduced.temperature, Some(0.2));
        assert!(CallOptions::default().is_empty());
    }

    #[test]
    fn test_call_options_serialization_skips_unset() {
        let json = serde_json::to_value(CallOptions::new().with_max_output_tokens(60)).unwrap();
        assert_eq!(json, serde_json::json!({"max_output_tokens": 60}));
    }

    #[tokio::test]
    async fn test_disabled_capability_reports_unavailable() {
        let cap = DisabledCapability::new("no key");
        assert!(!cap.is_available());

        let err = cap.create("m", "p", &CallOptions::new()).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("no key"));

        assert!(cap
            .open_stream("m", "p", &CallOptions::new())
            .await
            .is_err());
        assert!(cap.list_models().await.unwrap_err().is_unavailable());
    }
}
