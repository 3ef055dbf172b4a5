//! Courtroom turn orchestration.
//!
//! This library runs a fixed three-agent exchange (Opposing counsel, Judge,
//! Jury) over a session's pinned facts and transcript, on top of a single
//! pluggable text-generation capability.
//!
//! # Components
//!
//! - [`session`]: in-memory session store with per-session turn locks
//! - [`capability`]: the text-generation capability trait and a disabled stand-in
//! - [`adapter`]: resilient calls over the capability (call-shape fallback,
//!   streaming with completion fallback, response text extraction)
//! - [`verdict`]: jury verdict line parsing
//! - [`courtroom`]: phases, prompts, mock script, and the [`TurnOrchestrator`]
//! - [`events`]: stream events and the sinks that carry them
//! - [`resilience`]: fallback chains and capability health tracking
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use coordination::{DisabledCapability, ResilientAdapter, SessionStore, TurnOrchestrator};
//!
//! let adapter = Arc::new(ResilientAdapter::new(Arc::new(DisabledCapability::default())));
//! let orchestrator = TurnOrchestrator::new(SessionStore::new().shared(), adapter);
//!
//! let id = orchestrator.create_session("State v. Doe", "The door was locked.");
//! orchestrator.append_user_presentation(&id, "My client had a key.")?;
//! let results = orchestrator.run_sequence(&id, "My client had a key.").await?;
//! println!("{}", results[2].text); // Verdict: Guilty; Confidence: 60%
//! ```

pub mod adapter;
pub mod capability;
pub mod courtroom;
pub mod events;
pub mod resilience;
pub mod session;
pub mod verdict;

pub use adapter::{AdapterError, FragmentStream, ResilientAdapter};
pub use capability::{
    CallOptions, CapabilityError, DisabledCapability, RawEventStream, TextGenerationCapability,
};
pub use courtroom::{
    OrchestratorConfig, OrchestratorError, OrchestratorResult, Phase, PhaseResult, PhaseSettings,
    ReplySource, TurnOrchestrator,
};
pub use events::{CollectingSink, EventBus, EventSink, SessionEvent, SinkError, StreamEvent};
pub use resilience::{CapabilityHealth, DegradationLevel};
pub use session::{SessionId, SessionStore, SessionSummary, SharedSessionStore, Speaker};
pub use verdict::{parse_verdict, Verdict};
