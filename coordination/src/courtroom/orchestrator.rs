//! Turn orchestrator: drives Opposing → Judge → Jury over one session.
//!
//! Each phase builds its prompt from the session's facts (and the transcript
//! so far), calls the adapter, and appends exactly one transcript entry.
//! Phase failures never abort a sequence: an unconfigured capability yields
//! mock text and a failed call yields an error marker.

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::mock::MockScript;
use super::prompts::build_prompt;
use super::state::{error_marker, Phase, PhaseResult, ReplySource};
use crate::adapter::{AdapterError, ResilientAdapter};
use crate::capability::CallOptions;
use crate::events::{EventSink, StreamEvent};
use crate::session::{SessionId, SharedSessionStore, StoreError};

/// Model and output cap for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSettings {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl PhaseSettings {
    pub fn new(model: &str, max_output_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            max_output_tokens: Some(max_output_tokens),
        }
    }

    /// Call options for the first (fullest) call shape.
    pub fn options(&self) -> CallOptions {
        match self.max_output_tokens {
            Some(tokens) => CallOptions::new().with_max_output_tokens(tokens),
            None => CallOptions::new(),
        }
    }
}

/// Per-phase settings for a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub opposing: PhaseSettings,
    pub judge: PhaseSettings,
    pub jury: PhaseSettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            opposing: PhaseSettings::new("gpt-5-codex", 300),
            judge: PhaseSettings::new("gpt-5", 150),
            jury: PhaseSettings::new("gpt-5", 60),
        }
    }
}

impl OrchestratorConfig {
    pub fn for_phase(&self, phase: Phase) -> &PhaseSettings {
        match phase {
            Phase::Opposing => &self.opposing,
            Phase::Judge => &self.judge,
            Phase::Jury => &self.jury,
        }
    }

    pub fn for_phase_mut(&mut self, phase: Phase) -> &mut PhaseSettings {
        match phase {
            Phase::Opposing => &mut self.opposing,
            Phase::Judge => &mut self.judge,
            Phase::Jury => &mut self.jury,
        }
    }
}

/// Error from the turn orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(id) => Self::SessionNotFound(id),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Runs courtroom sequences against a session store and one adapter.
pub struct TurnOrchestrator {
    store: SharedSessionStore,
    adapter: Arc<ResilientAdapter>,
    config: OrchestratorConfig,
    mock: MockScript,
}

impl TurnOrchestrator {
    pub fn new(store: SharedSessionStore, adapter: Arc<ResilientAdapter>) -> Self {
        Self::with_config(store, adapter, OrchestratorConfig::default())
    }

    pub fn with_config(
        store: SharedSessionStore,
        adapter: Arc<ResilientAdapter>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            adapter,
            config,
            mock: MockScript,
        }
    }

    pub fn store(&self) -> &SharedSessionStore {
        &self.store
    }

    pub fn adapter(&self) -> &Arc<ResilientAdapter> {
        &self.adapter
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Create a session with an empty transcript.
    pub fn create_session(&self, title: &str, facts: &str) -> SessionId {
        self.store.create(title, facts)
    }

    /// Append a `User` transcript entry.
    pub fn append_user_presentation(&self, session_id: &str, text: &str) -> OrchestratorResult<()> {
        self.store.append_user_text(session_id, text)?;
        Ok(())
    }

    /// Run all three phases in blocking mode.
    pub async fn run_sequence(
        &self,
        session_id: &str,
        argument: &str,
    ) -> OrchestratorResult<Vec<PhaseResult>> {
        let lock = self.store.turn_lock(session_id)?;
        let _turn = lock.lock().await;
        info!(session_id, "sequence started");

        let mut results = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            results.push(self.complete_phase(session_id, phase, argument).await?);
        }
        info!(session_id, verdict = ?results.last().and_then(|r| r.verdict), "sequence finished");
        Ok(results)
    }

    /// Run a single phase in blocking mode.
    pub async fn run_phase(
        &self,
        session_id: &str,
        phase: Phase,
        argument: &str,
    ) -> OrchestratorResult<PhaseResult> {
        let lock = self.store.turn_lock(session_id)?;
        let _turn = lock.lock().await;
        self.complete_phase(session_id, phase, argument).await
    }

    /// Run all three phases, pushing events into `sink` as they arrive.
    ///
    /// Returns after the Jury's terminal event has been delivered.
    pub async fn run_sequence_streaming(
        &self,
        session_id: &str,
        argument: &str,
        sink: &dyn EventSink,
    ) -> OrchestratorResult<Vec<PhaseResult>> {
        let lock = self.store.turn_lock(session_id)?;
        let _turn = lock.lock().await;
        info!(session_id, "streaming sequence started");

        let mut results = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            results.push(self.stream_phase(session_id, phase, argument, sink).await?);
        }
        info!(session_id, "streaming sequence finished");
        Ok(results)
    }

    /// Run a streaming sequence on its own task.
    ///
    /// An unknown session is reported to `sink` as a single `error` event.
    pub fn spawn_sequence_streaming(
        self: &Arc<Self>,
        session_id: &str,
        argument: &str,
        sink: Arc<dyn EventSink>,
    ) -> JoinHandle<OrchestratorResult<Vec<PhaseResult>>> {
        let this = Arc::clone(self);
        let session_id = session_id.to_string();
        let argument = argument.to_string();
        tokio::spawn(async move {
            let outcome = this
                .run_sequence_streaming(&session_id, &argument, sink.as_ref())
                .await;
            if let Err(ref err) = outcome {
                deliver(
                    sink.as_ref(),
                    StreamEvent::Error {
                        agent: Phase::Opposing,
                        error: err.to_string(),
                    },
                );
            }
            outcome
        })
    }

    // ── Phase execution ──

    fn prompt_for(&self, session_id: &str, phase: Phase, argument: &str) -> OrchestratorResult<String> {
        let facts = self.store.facts(session_id)?;
        let transcript = match phase {
            Phase::Opposing => String::new(),
            Phase::Judge | Phase::Jury => self.store.render_transcript(session_id)?,
        };
        Ok(build_prompt(phase, &facts, argument, &transcript))
    }

    fn record(&self, session_id: &str, result: PhaseResult) -> OrchestratorResult<PhaseResult> {
        self.store
            .append(session_id, result.agent.speaker(), &result.text)?;
        Ok(result)
    }

    async fn complete_phase(
        &self,
        session_id: &str,
        phase: Phase,
        argument: &str,
    ) -> OrchestratorResult<PhaseResult> {
        let result = if !self.adapter.is_available() {
            debug!(session_id, agent = %phase, "capability unavailable, using mock reply");
            PhaseResult::new(phase, self.mock.reply(phase), ReplySource::Mock)
        } else {
            let prompt = self.prompt_for(session_id, phase, argument)?;
            let settings = self.config.for_phase(phase);
            match self
                .adapter
                .complete(&settings.model, &prompt, &settings.options())
                .await
            {
                Ok(text) => PhaseResult::new(phase, text, ReplySource::Live),
                Err(err) => self.fallback_result(session_id, phase, &err),
            }
        };
        self.record(session_id, result)
    }

    async fn stream_phase(
        &self,
        session_id: &str,
        phase: Phase,
        argument: &str,
        sink: &dyn EventSink,
    ) -> OrchestratorResult<PhaseResult> {
        if !self.adapter.is_available() {
            return self.stream_mock(session_id, phase, sink);
        }

        let prompt = self.prompt_for(session_id, phase, argument)?;
        let settings = self.config.for_phase(phase);
        let opened = self
            .adapter
            .stream(&settings.model, &prompt, &settings.options())
            .await;

        let result = match opened {
            Ok(mut fragments) => {
                let mut text = String::new();
                let mut failure = None;
                while let Some(item) = fragments.next().await {
                    match item {
                        Ok(fragment) => {
                            text.push_str(&fragment);
                            deliver(
                                sink,
                                StreamEvent::Delta {
                                    agent: phase,
                                    delta: fragment,
                                },
                            );
                        }
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
                match failure {
                    None => PhaseResult::new(phase, text, ReplySource::Live),
                    Some(err) => self.fallback_result(session_id, phase, &err),
                }
            }
            Err(err) if err.is_unavailable() => {
                return self.stream_mock(session_id, phase, sink);
            }
            Err(err) => self.fallback_result(session_id, phase, &err),
        };

        let result = self.record(session_id, result)?;
        deliver(sink, result.done_event());
        Ok(result)
    }

    fn stream_mock(
        &self,
        session_id: &str,
        phase: Phase,
        sink: &dyn EventSink,
    ) -> OrchestratorResult<PhaseResult> {
        for fragment in self.mock.fragments(phase) {
            deliver(
                sink,
                StreamEvent::Delta {
                    agent: phase,
                    delta: (*fragment).to_string(),
                },
            );
        }
        let result = self.record(
            session_id,
            PhaseResult::new(phase, self.mock.reply(phase), ReplySource::Mock),
        )?;
        deliver(sink, result.done_event());
        Ok(result)
    }

    fn fallback_result(&self, session_id: &str, phase: Phase, err: &AdapterError) -> PhaseResult {
        if err.is_unavailable() {
            debug!(session_id, agent = %phase, "capability unavailable, using mock reply");
            PhaseResult::new(phase, self.mock.reply(phase), ReplySource::Mock)
        } else {
            warn!(session_id, agent = %phase, error = %err, "phase call failed");
            PhaseResult::new(phase, error_marker(phase, err), ReplySource::Failed)
        }
    }
}

/// Deliver one event, dropping sink failures.
fn deliver(sink: &dyn EventSink, event: StreamEvent) {
    let event_type = event.event_type();
    if let Err(err) = sink.deliver(event) {
        debug!(event_type, error = %err, "sink delivery failed, event dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{
        CapabilityError, DisabledCapability, RawEventStream, TextGenerationCapability,
    };
    use crate::events::sink::MockEventSink;
    use crate::events::{CollectingSink, SinkError};
    use crate::session::{SessionStore, Speaker};
    use crate::verdict::Verdict;
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Replies per phase keyed on a marker in the prompt.
    struct Scripted {
        prompts: Mutex<Vec<String>>,
        fail_judge: bool,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail_judge: false,
            }
        }

        fn reply_for(prompt: &str) -> &'static str {
            if prompt.starts_with("You are Opposing Counsel.") {
                "Objection, speculation."
            } else if prompt.starts_with("You are the Judge.") {
                "SUSTAINED - speculative."
            } else {
                "Verdict: Not Guilty; Confidence: 73%"
            }
        }
    }

    #[async_trait]
    impl TextGenerationCapability for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn create(
            &self,
            _model: &str,
            prompt: &str,
            _options: &CallOptions,
        ) -> Result<Value, CapabilityError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail_judge && prompt.starts_with("You are the Judge.") {
                return Err(CapabilityError::RequestFailed("timeout".into()));
            }
            Ok(json!({"output_text": Self::reply_for(prompt)}))
        }

        async fn open_stream(
            &self,
            _model: &str,
            prompt: &str,
            _options: &CallOptions,
        ) -> Result<RawEventStream, CapabilityError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let reply = Self::reply_for(prompt);
            let (head, tail) = reply.split_at(reply.len() / 2);
            let events = vec![
                Ok(json!({"type": "response.output_text.delta", "delta": head})),
                Ok(json!({"type": "response.output_text.delta", "delta": tail})),
            ];
            Ok(stream::iter(events).boxed())
        }
    }

    fn orchestrator(capability: Arc<dyn TextGenerationCapability>) -> TurnOrchestrator {
        TurnOrchestrator::new(
            SessionStore::new().shared(),
            Arc::new(ResilientAdapter::new(capability)),
        )
    }

    #[test]
    fn test_default_phase_settings() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.for_phase(Phase::Opposing).model, "gpt-5-codex");
        assert_eq!(config.for_phase(Phase::Opposing).max_output_tokens, Some(300));
        assert_eq!(config.for_phase(Phase::Judge).max_output_tokens, Some(150));
        assert_eq!(config.for_phase(Phase::Jury).options().max_output_tokens, Some(60));
    }

    #[tokio::test]
    async fn test_mock_sequence() {
        let orch = orchestrator(Arc::new(DisabledCapability::default()));
        let id = orch.create_session("Case", "Some facts here");
        orch.append_user_presentation(&id, "an argument").unwrap();

        let results = orch.run_sequence(&id, "an argument").await.unwrap();
        let agents: Vec<_> = results.iter().map(|r| r.agent).collect();
        assert_eq!(agents, Phase::ALL.to_vec());
        assert!(results.iter().all(|r| r.source == ReplySource::Mock));
        assert_eq!(results[2].verdict, Some(Verdict::Guilty));
        assert_eq!(results[2].confidence, Some(60));

        let transcript = orch.store().transcript(&id).unwrap();
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[1].speaker, Speaker::Opposing);
        assert_eq!(transcript[3].text, results[2].text);
    }

    #[tokio::test]
    async fn test_live_sequence_feeds_transcript_forward() {
        let capability = Arc::new(Scripted::new());
        let orch = orchestrator(capability.clone());
        let id = orch.create_session("Case", "The door was locked.");
        orch.append_user_presentation(&id, "My client had a key.").unwrap();

        let results = orch.run_sequence(&id, "My client had a key.").await.unwrap();
        assert_eq!(results[0].text, "Objection, speculation.");
        assert_eq!(results[2].verdict, Some(Verdict::NotGuilty));
        assert_eq!(results[2].confidence, Some(73));

        let prompts = capability.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("User argument:\nMy client had a key."));
        assert!(prompts[1].contains("Opposing: Objection, speculation."));
        assert!(prompts[2].contains("Judge: SUSTAINED - speculative."));
    }

    #[tokio::test]
    async fn test_failed_phase_records_marker_and_continues() {
        let capability = Arc::new(Scripted {
            prompts: Mutex::new(Vec::new()),
            fail_judge: true,
        });
        let orch = orchestrator(capability);
        let id = orch.create_session("Case", "F");

        let results = orch.run_sequence(&id, "arg").await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].source, ReplySource::Failed);
        assert!(results[1].text.starts_with("(error) Judge:"));
        assert_eq!(results[2].source, ReplySource::Live);

        let transcript = orch.store().render_transcript(&id).unwrap();
        assert!(transcript.contains("Judge: (error) Judge:"));
    }

    #[tokio::test]
    async fn test_unknown_session_fails_before_any_phase() {
        let capability = Arc::new(Scripted::new());
        let orch = orchestrator(capability.clone());
        let err = orch.run_sequence("missing", "arg").await.unwrap_err();
        assert_eq!(err, OrchestratorError::SessionNotFound("missing".into()));
        assert!(capability.prompts.lock().unwrap().is_empty());

        let sink = CollectingSink::new();
        assert!(orch
            .run_sequence_streaming("missing", "arg", &sink)
            .await
            .is_err());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_streaming_deltas_concat_to_done() {
        let orch = orchestrator(Arc::new(Scripted::new()));
        let id = orch.create_session("Case", "F");
        let sink = CollectingSink::new();

        let results = orch.run_sequence_streaming(&id, "arg", &sink).await.unwrap();
        let events = sink.into_events();

        for (phase, result) in Phase::ALL.iter().zip(&results) {
            let joined: String = events
                .iter()
                .filter(|e| e.agent() == *phase)
                .filter_map(StreamEvent::delta_text)
                .collect();
            assert_eq!(joined, result.text);
        }
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 3);
        assert_eq!(events.last(), Some(&results[2].done_event()));
    }

    #[tokio::test]
    async fn test_streaming_sequence_feeds_transcript_forward() {
        let capability = Arc::new(Scripted::new());
        let orch = orchestrator(capability.clone());
        let id = orch.create_session("Case", "The door was locked.");
        orch.append_user_presentation(&id, "My client had a key.").unwrap();

        let sink = CollectingSink::new();
        let results = orch
            .run_sequence_streaming(&id, "My client had a key.", &sink)
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.source == ReplySource::Live));

        let prompts = capability.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("User argument:\nMy client had a key."));
        assert!(prompts[1].contains("Opposing: Objection, speculation."));
        assert!(prompts[2].contains("Judge: SUSTAINED - speculative."));
        assert!(prompts[2].contains("Opposing: Objection, speculation."));
    }

    #[tokio::test]
    async fn test_streaming_mock_matches_blocking_mock() {
        let orch = orchestrator(Arc::new(DisabledCapability::default()));
        let a = orch.create_session("A", "Some facts here");
        let b = orch.create_session("B", "Some facts here");

        let blocking = orch.run_sequence(&a, "an argument").await.unwrap();
        let sink = CollectingSink::new();
        let streamed = orch
            .run_sequence_streaming(&b, "an argument", &sink)
            .await
            .unwrap();

        let texts = |rs: &[PhaseResult]| rs.iter().map(|r| r.text.clone()).collect::<Vec<_>>();
        assert_eq!(texts(&blocking), texts(&streamed));
    }

    #[tokio::test]
    async fn test_sink_failures_are_swallowed() {
        let orch = orchestrator(Arc::new(DisabledCapability::default()));
        let id = orch.create_session("Case", "F");

        let mut sink = MockEventSink::new();
        sink.expect_deliver()
            .returning(|_| Err(SinkError::Failed("gone".into())));

        let results = orch.run_sequence_streaming(&id, "arg", &sink).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(orch.store().transcript(&id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_spawned_unknown_session_emits_error_event() {
        let orch = Arc::new(orchestrator(Arc::new(DisabledCapability::default())));
        let sink = Arc::new(CollectingSink::new());

        let handle = orch.spawn_sequence_streaming("nope", "arg", sink.clone());
        assert!(handle.await.unwrap().is_err());

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "error");
    }

    #[tokio::test]
    async fn test_run_phase_single_agent() {
        let orch = orchestrator(Arc::new(DisabledCapability::default()));
        let id = orch.create_session("Case", "F");
        let result = orch.run_phase(&id, Phase::Opposing, "arg").await.unwrap();
        assert_eq!(result.agent, Phase::Opposing);
        assert_eq!(result.source, ReplySource::Mock);
        assert_eq!(orch.store().transcript(&id).unwrap().len(), 1);
    }
}
