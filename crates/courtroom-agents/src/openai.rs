//! OpenAI Responses API capability.
//!
//! `POST {base_url}/responses` for both one-shot and streamed calls;
//! `GET {base_url}/models` for model listing. Streamed bodies are
//! server-sent events; only text-delta and error events are forwarded to
//! the adapter, lifecycle events are dropped here.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use coordination::adapter::OUTPUT_TEXT_DELTA;
use coordination::{CallOptions, CapabilityError, RawEventStream, TextGenerationCapability};
use futures::future;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ProviderConfig;

/// Live text-generation capability backed by the OpenAI Responses API.
pub struct OpenAiResponses {
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiResponses {
    /// `timeout` bounds each one-shot request as a whole. Streamed bodies
    /// may run longer; they are bounded by the same value between reads.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
            client,
        })
    }

    /// Build from provider settings; `None` when no API key is configured.
    pub fn from_config(config: &ProviderConfig) -> Result<Option<Self>> {
        match config.api_key() {
            Some(key) => Ok(Some(Self::new(&config.base_url, key, config.timeout())?)),
            None => Ok(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whole-request deadline, if any.
    fn request_timeout(&self, stream: bool) -> Option<Duration> {
        (!stream).then_some(self.timeout)
    }

    async fn post_responses(
        &self,
        body: &Value,
        stream: bool,
    ) -> Result<reqwest::Response, CapabilityError> {
        let mut request = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body);
        if let Some(timeout) = self.request_timeout(stream) {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CapabilityError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerationCapability for OpenAiResponses {
    fn name(&self) -> &str {
        "openai-responses"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn create(
        &self,
        model: &str,
        prompt: &str,
        options: &CallOptions,
    ) -> Result<Value, CapabilityError> {
        let body = request_body(model, prompt, options, false);
        debug!(model, options = ?options, "POST /responses");
        self.post_responses(&body, false)
            .await?
            .json()
            .await
            .map_err(|e| CapabilityError::Malformed(e.to_string()))
    }

    async fn open_stream(
        &self,
        model: &str,
        prompt: &str,
        options: &CallOptions,
    ) -> Result<RawEventStream, CapabilityError> {
        let body = request_body(model, prompt, options, true);
        debug!(model, options = ?options, "POST /responses (stream)");
        let response = self.post_responses(&body, true).await?;

        // `None` marks the end of the body so the decoder can flush.
        let events = response
            .bytes_stream()
            .map(Some)
            .chain(stream::once(future::ready(None)))
            .scan(SseDecoder::default(), |decoder, chunk| {
                let items: Vec<Result<Value, CapabilityError>> = match chunk {
                    Some(Ok(bytes)) => forwardable_events(decoder.push(&bytes)),
                    Some(Err(e)) => vec![Err(CapabilityError::RequestFailed(e.to_string()))],
                    None => forwardable_events(decoder.finish()),
                };
                future::ready(Some(stream::iter(items)))
            })
            .flatten();
        Ok(events.boxed())
    }

    async fn list_models(&self) -> Result<Vec<String>, CapabilityError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| CapabilityError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let listing: Value = response
            .json()
            .await
            .map_err(|e| CapabilityError::Malformed(e.to_string()))?;
        Ok(model_ids(&listing))
    }
}

// ── Wire helpers ──

/// JSON body for `POST /responses`. Unset options are omitted entirely.
pub fn request_body(model: &str, prompt: &str, options: &CallOptions, stream: bool) -> Value {
    let mut body = json!({
        "model": model,
        "input": prompt,
    });
    if let Some(tokens) = options.max_output_tokens {
        body["max_output_tokens"] = json!(tokens);
    }
    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }
    if stream {
        body["stream"] = json!(true);
    }
    body
}

/// Map a non-success HTTP status to a capability error.
///
/// A 400 naming an unsupported or unknown parameter is an option rejection,
/// which lets the adapter retry with a smaller call shape.
pub fn classify_failure(status: StatusCode, body: &str) -> CapabilityError {
    let lowered = body.to_ascii_lowercase();
    let rejects_option = status == StatusCode::BAD_REQUEST
        && (lowered.contains("unsupported parameter")
            || lowered.contains("unknown parameter")
            || lowered.contains("not supported")
            || lowered.contains("unrecognized request argument"));
    if rejects_option {
        CapabilityError::OptionRejected(body.to_string())
    } else {
        CapabilityError::RequestFailed(format!("OpenAI API error ({status}): {body}"))
    }
}

/// Sorted model ids from a `GET /models` listing.
pub fn model_ids(listing: &Value) -> Vec<String> {
    let mut ids: Vec<String> = listing["data"]
        .as_array()
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    ids.sort();
    ids
}

/// Interpret one SSE `data:` payload.
///
/// Text deltas pass through, error events become errors, everything else
/// (lifecycle events, the `[DONE]` sentinel) is dropped.
pub fn forwardable_event(data: &str) -> Option<Result<Value, CapabilityError>> {
    if data == "[DONE]" {
        return None;
    }
    let event: Value = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => return Some(Err(CapabilityError::Malformed(format!("{e}: {data}")))),
    };
    match event["type"].as_str() {
        Some(OUTPUT_TEXT_DELTA) => Some(Ok(event)),
        Some("error") => Some(Err(CapabilityError::RequestFailed(error_message(
            &event, &["message"],
        )))),
        Some("response.failed") => Some(Err(CapabilityError::RequestFailed(error_message(
            &event,
            &["response", "error", "message"],
        )))),
        _ => None,
    }
}

fn forwardable_events(payloads: Vec<String>) -> Vec<Result<Value, CapabilityError>> {
    payloads
        .iter()
        .filter_map(|data| forwardable_event(data))
        .collect()
}

fn error_message(event: &Value, path: &[&str]) -> String {
    path.iter()
        .try_fold(event, |value, key| value.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| event.to_string())
}

/// Incremental server-sent-events decoder.
///
/// Collects `data:` lines and yields one payload per blank-line-terminated
/// event. Chunk boundaries may fall anywhere, including inside a UTF-8
/// sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk; returns the payloads of every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut completed = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    completed.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(payload) = line.strip_prefix("data:") {
                self.data
                    .push(payload.strip_prefix(' ').unwrap_or(payload).to_string());
            }
        }
        completed
    }

    /// Flush at end of body. An event whose closing blank line never
    /// arrived, or whose last line lacks a newline, is still emitted.
    pub fn finish(&mut self) -> Vec<String> {
        self.push(b"\n\n")
    }
}
