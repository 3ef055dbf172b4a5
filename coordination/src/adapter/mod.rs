//! Resilient call adapter over a single text-generation capability.
//!
//! Exposes two operations:
//!
//! - [`ResilientAdapter::complete`]: one-shot text. Tries the call shapes
//!   `full` → `without_max_length` → `bare` and reports
//!   [`AdapterError::CallFailed`] only once all of them failed.
//! - [`ResilientAdapter::stream`]: concatenable text fragments. Falls back to
//!   `complete` (yielded as one fragment) when the incremental call cannot be
//!   opened.
//!
//! An unconfigured capability surfaces as
//! [`AdapterError::CapabilityUnavailable`] from both operations; substituting
//! mock text is the orchestrator's decision, not the adapter's.

pub mod extract;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::capability::{CallOptions, CapabilityError, RawEventStream, TextGenerationCapability};
use crate::resilience::{CapabilityHealth, ChainFailure, FallbackChain};

pub use extract::{extract_event_fragment, extract_response_text, OUTPUT_TEXT_DELTA};

/// Concatenable text fragments from a streaming call.
pub type FragmentStream = BoxStream<'static, Result<String, AdapterError>>;

/// Adapter-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// The capability is not configured; callers substitute mock output.
    #[error("text-generation capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// The capability is configured but every call shape failed.
    #[error("call failed after {attempts} attempt(s): {message}")]
    CallFailed { attempts: usize, message: String },
}

impl AdapterError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::CapabilityUnavailable(_))
    }

    fn from_chain(failure: ChainFailure<CapabilityError>) -> Self {
        match failure.error {
            CapabilityError::Unavailable(reason) => Self::CapabilityUnavailable(reason),
            other => Self::CallFailed {
                attempts: failure.attempts,
                message: other.to_string(),
            },
        }
    }
}

/// Resilient wrapper around one capability.
pub struct ResilientAdapter {
    capability: Arc<dyn TextGenerationCapability>,
    health: Arc<Mutex<CapabilityHealth>>,
}

impl ResilientAdapter {
    pub fn new(capability: Arc<dyn TextGenerationCapability>) -> Self {
        let health = CapabilityHealth::new(capability.name());
        Self {
            capability,
            health: Arc::new(Mutex::new(health)),
        }
    }

    /// Whether the wrapped capability is configured.
    pub fn is_available(&self) -> bool {
        self.capability.is_available()
    }

    /// Name of the wrapped capability.
    pub fn capability_name(&self) -> &str {
        self.capability.name()
    }

    /// Snapshot of call health.
    pub fn health(&self) -> CapabilityHealth {
        lock_health(&self.health).clone()
    }

    /// One-shot completion.
    pub async fn complete(
        &self,
        model: &str,
        prompt: &str,
        options: &CallOptions,
    ) -> Result<String, AdapterError> {
        self.ensure_available()?;

        let chain = FallbackChain::new("complete", "full", options.clone())
            .add_tier("without_max_length", options.without_max_output_tokens())
            .add_tier("bare", CallOptions::default());

        let capability = &self.capability;
        let outcome = chain
            .execute(
                |opts| async move { capability.create(model, prompt, &opts).await },
                CapabilityError::is_unavailable,
            )
            .await;

        match outcome {
            Ok(served) => {
                if served.is_degraded() {
                    warn!(
                        capability = self.capability.name(),
                        model,
                        served_by = %served.served_by,
                        warnings = ?served.warnings,
                        "completion served by fallback call shape"
                    );
                }
                self.record_success();
                Ok(extract_response_text(&served.payload))
            }
            Err(failure) => {
                let err = AdapterError::from_chain(failure);
                if !err.is_unavailable() {
                    warn!(capability = self.capability.name(), model, error = %err, "completion failed");
                    self.record_failure(&err);
                }
                Err(err)
            }
        }
    }

    /// Incremental completion.
    ///
    /// Failures after the stream has opened arrive as a `CallFailed` item and
    /// end the stream; the call is not silently re-issued, so delivered
    /// fragments never repeat. Health is recorded when the stream finishes.
    pub async fn stream(
        &self,
        model: &str,
        prompt: &str,
        options: &CallOptions,
    ) -> Result<FragmentStream, AdapterError> {
        self.ensure_available()?;

        let chain = FallbackChain::new("stream", "full", options.clone())
            .add_tier("without_max_length", options.without_max_output_tokens());

        let capability = &self.capability;
        let opened = chain
            .execute(
                |opts| async move { capability.open_stream(model, prompt, &opts).await },
                CapabilityError::is_unavailable,
            )
            .await;

        match opened {
            Ok(served) => Ok(tracked_fragments(served.payload, Arc::clone(&self.health))),
            Err(failure) if failure.error.is_unavailable() => {
                Err(AdapterError::from_chain(failure))
            }
            Err(failure) => {
                debug!(
                    capability = self.capability.name(),
                    model,
                    error = %failure.error,
                    "streaming unavailable, falling back to completion"
                );
                let text = self.complete(model, prompt, options).await?;
                Ok(stream::once(async move { Ok(text) }).boxed())
            }
        }
    }

    /// Models served by the capability.
    pub async fn list_models(&self) -> Result<Vec<String>, AdapterError> {
        self.capability.list_models().await.map_err(|e| match e {
            CapabilityError::Unavailable(reason) => AdapterError::CapabilityUnavailable(reason),
            other => AdapterError::CallFailed {
                attempts: 1,
                message: other.to_string(),
            },
        })
    }

    fn ensure_available(&self) -> Result<(), AdapterError> {
        if self.capability.is_available() {
            Ok(())
        } else {
            Err(AdapterError::CapabilityUnavailable(format!(
                "{} is not configured",
                self.capability.name()
            )))
        }
    }

    fn record_success(&self) {
        lock_health(&self.health).record_success();
    }

    fn record_failure(&self, err: &AdapterError) {
        lock_health(&self.health).record_failure(&err.to_string());
    }
}

fn lock_health(health: &Mutex<CapabilityHealth>) -> MutexGuard<'_, CapabilityHealth> {
    health.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map raw stream events to text fragments, stopping at the first error.
///
/// A stream that runs to its end counts as one successful call; one that
/// errors counts as one failure. A stream dropped early records nothing.
fn tracked_fragments(
    events: RawEventStream,
    health: Arc<Mutex<CapabilityHealth>>,
) -> FragmentStream {
    stream::unfold(Some((events, health)), |state| async move {
        let (mut events, health) = state?;
        loop {
            match events.next().await {
                Some(Ok(event)) => {
                    if let Some(fragment) = extract_event_fragment(&event) {
                        return Some((Ok(fragment), Some((events, health))));
                    }
                }
                Some(Err(e)) => {
                    let err = AdapterError::CallFailed {
                        attempts: 1,
                        message: e.to_string(),
                    };
                    warn!(error = %err, "stream failed after opening");
                    lock_health(&health).record_failure(&err.to_string());
                    return Some((Err(err), None));
                }
                None => {
                    lock_health(&health).record_success();
                    return None;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::DisabledCapability;
    use crate::courtroom::{OrchestratorConfig, Phase};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::resilience::DegradationLevel;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Rejects any call whose options are "richer" than `accept_from`.
    struct ShapeSensitive {
        /// 0 = accept full, 1 = accept without max length, 2 = accept bare only, 3 = reject all
        accept_from: usize,
        calls: Mutex<Vec<CallOptions>>,
    }

    impl ShapeSensitive {
        fn new(accept_from: usize) -> Self {
            Self {
                accept_from,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn rank(opts: &CallOptions) -> usize {
            match (opts.max_output_tokens, opts.temperature) {
                (Some(_), _) => 0,
                (None, Some(_)) => 1,
                (None, None) => 2,
            }
        }
    }

    #[async_trait]
    impl TextGenerationCapability for ShapeSensitive {
        fn name(&self) -> &str {
            "shape-sensitive"
        }

        async fn create(
            &self,
            _model: &str,
            _prompt: &str,
            options: &CallOptions,
        ) -> Result<Value, CapabilityError> {
            self.calls.lock().unwrap().push(options.clone());
            if Self::rank(options) >= self.accept_from {
                Ok(json!({"output_text": format!("ok at rank {}", Self::rank(options))}))
            } else {
                Err(CapabilityError::OptionRejected(format!(
                    "shape rank {} rejected",
                    Self::rank(options)
                )))
            }
        }
    }

    struct Streaming {
        events: Vec<Result<Value, CapabilityError>>,
    }

    #[async_trait]
    impl TextGenerationCapability for Streaming {
        fn name(&self) -> &str {
            "streaming"
        }

        async fn create(
            &self,
            _model: &str,
            _prompt: &str,
            _options: &CallOptions,
        ) -> Result<Value, CapabilityError> {
            Ok(json!({"output_text": "fallback"}))
        }

        async fn open_stream(
            &self,
            _model: &str,
            _prompt: &str,
            _options: &CallOptions,
        ) -> Result<RawEventStream, CapabilityError> {
            Ok(stream::iter(self.events.clone()).boxed())
        }
    }

    /// Streaming that refuses to open; completion still works.
    struct NoStream;

    #[async_trait]
    impl TextGenerationCapability for NoStream {
        fn name(&self) -> &str {
            "no-stream"
        }

        async fn create(
            &self,
            _model: &str,
            _prompt: &str,
            _options: &CallOptions,
        ) -> Result<Value, CapabilityError> {
            Ok(json!({"output_text": "FULL TEXT"}))
        }
    }

    fn full_options() -> CallOptions {
        CallOptions::new()
            .with_max_output_tokens(300)
            .with_temperature(0.3)
    }

    async fn collect(stream: FragmentStream) -> Vec<Result<String, AdapterError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_complete_primary_shape() {
        let cap = Arc::new(ShapeSensitive::new(0));
        let adapter = ResilientAdapter::new(cap.clone());
        let text = adapter.complete("m", "p", &full_options()).await.unwrap();
        assert_eq!(text, "ok at rank 0");
        assert_eq!(cap.calls.lock().unwrap().len(), 1);
        assert_eq!(adapter.health().level, DegradationLevel::Full);
    }

    #[tokio::test]
    async fn test_complete_third_shape_after_two_rejections() {
        let cap = Arc::new(ShapeSensitive::new(2));
        let adapter = ResilientAdapter::new(cap.clone());
        let text = adapter.complete("m", "p", &full_options()).await.unwrap();
        assert_eq!(text, "ok at rank 2");

        let calls = cap.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], full_options());
        assert_eq!(calls[1].max_output_tokens, None);
        assert_eq!(calls[1].temperature, Some(0.3));
        assert!(calls[2].is_empty());
    }

    #[tokio::test]
    async fn test_complete_call_failed_after_all_shapes() {
        let cap = Arc::new(ShapeSensitive::new(3));
        let adapter = ResilientAdapter::new(cap.clone());
        let err = adapter.complete("m", "p", &full_options()).await.unwrap_err();
        match err {
            AdapterError::CallFailed { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("shape rank 2 rejected"));
            }
            other => panic!("expected CallFailed, got {other:?}"),
        }
        assert_eq!(cap.calls.lock().unwrap().len(), 3);
        assert_eq!(adapter.health().total_failures, 1);
    }

    /// Rejects the first `reject` calls regardless of their shape.
    struct RejectsFirst {
        reject: usize,
        calls: AtomicUsize,
        seen: Mutex<Vec<CallOptions>>,
    }

    impl RejectsFirst {
        fn new(reject: usize) -> Self {
            Self {
                reject,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerationCapability for RejectsFirst {
        fn name(&self) -> &str {
            "rejects-first"
        }

        async fn create(
            &self,
            _model: &str,
            _prompt: &str,
            options: &CallOptions,
        ) -> Result<Value, CapabilityError> {
            self.seen.lock().unwrap().push(options.clone());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.reject {
                Err(CapabilityError::OptionRejected(format!("reject {n}")))
            } else {
                Ok(json!({"output_text": format!("accepted call {n}")}))
            }
        }
    }

    #[tokio::test]
    async fn test_complete_tries_three_shapes_with_phase_defaults() {
        let config = OrchestratorConfig::default();
        let options = config.for_phase(Phase::Jury).options();
        assert_eq!(options.temperature, None);

        let cap = Arc::new(RejectsFirst::new(2));
        let adapter = ResilientAdapter::new(cap.clone());
        let text = adapter.complete("gpt-5", "p", &options).await.unwrap();
        assert_eq!(text, "accepted call 2");

        let seen = cap.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].max_output_tokens, Some(60));
        assert!(seen[1].is_empty());
        assert!(seen[2].is_empty());
    }

    #[tokio::test]
    async fn test_complete_identical_shapes_all_fail() {
        let cap = Arc::new(RejectsFirst::new(usize::MAX));
        let adapter = ResilientAdapter::new(cap.clone());
        let err = adapter.complete("m", "p", &CallOptions::default()).await.unwrap_err();
        assert!(matches!(err, AdapterError::CallFailed { attempts: 3, .. }));
        assert_eq!(cap.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disabled_capability_is_unavailable() {
        let adapter = ResilientAdapter::new(Arc::new(DisabledCapability::default()));
        assert!(!adapter.is_available());
        let err = adapter.complete("m", "p", &full_options()).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(adapter
            .stream("m", "p", &full_options())
            .await
            .err()
            .is_some_and(|e| e.is_unavailable()));
        assert_eq!(adapter.health().total_calls, 0);
    }

    #[tokio::test]
    async fn test_stream_delta_events() {
        let cap = Streaming {
            events: vec![
                Ok(json!({"type": OUTPUT_TEXT_DELTA, "delta": "Hello "})),
                Ok(json!({"type": OUTPUT_TEXT_DELTA, "delta": "world"})),
            ],
        };
        let adapter = ResilientAdapter::new(Arc::new(cap));
        let out = collect(adapter.stream("m", "p", &full_options()).await.unwrap()).await;
        let joined: String = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(joined, "Hello world");
    }

    #[tokio::test]
    async fn test_stream_output_text_events() {
        let cap = Streaming {
            events: vec![
                Ok(json!({"output_text": "Partial1"})),
                Ok(json!({"output_text": "Partial2"})),
            ],
        };
        let adapter = ResilientAdapter::new(Arc::new(cap));
        let out = collect(adapter.stream("m", "p", &full_options()).await.unwrap()).await;
        let joined: String = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(joined, "Partial1Partial2");
    }

    #[tokio::test]
    async fn test_stream_falls_back_to_complete() {
        let adapter = ResilientAdapter::new(Arc::new(NoStream));
        let out = collect(adapter.stream("m", "p", &full_options()).await.unwrap()).await;
        assert_eq!(out, vec![Ok("FULL TEXT".to_string())]);
    }

    #[tokio::test]
    async fn test_stream_mid_failure_surfaces_as_item() {
        let cap = Streaming {
            events: vec![
                Ok(json!({"delta": "partial"})),
                Err(CapabilityError::RequestFailed("connection reset".into())),
            ],
        };
        let adapter = ResilientAdapter::new(Arc::new(cap));
        let out = collect(adapter.stream("m", "p", &full_options()).await.unwrap()).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok("partial".to_string()));
        assert!(matches!(&out[1], Err(AdapterError::CallFailed { message, .. }) if message.contains("connection reset")));

        let health = adapter.health();
        assert_eq!(health.total_calls, 1);
        assert_eq!(health.total_failures, 1);
        assert_eq!(health.level, DegradationLevel::Partial);
        assert!(health.last_error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_stream_success_recorded_at_end() {
        let cap = Streaming {
            events: vec![Ok(json!({"delta": "a"})), Ok(json!({"delta": "b"}))],
        };
        let adapter = ResilientAdapter::new(Arc::new(cap));
        let stream = adapter.stream("m", "p", &full_options()).await.unwrap();
        assert_eq!(adapter.health().total_calls, 0);

        let out = collect(stream).await;
        assert_eq!(out.len(), 2);
        let health = adapter.health();
        assert_eq!(health.total_calls, 1);
        assert_eq!(health.total_failures, 0);
    }
}
