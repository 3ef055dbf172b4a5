//! Courtroom turn orchestration.
//!
//! One sequence runs three agents in fixed order against a session:
//!
//! ```text
//! User argument
//!      │
//!      ▼
//! Opposing ──▶ Judge ──▶ Jury ──▶ [Verdict parser]
//!  (facts +     (facts +   (facts +       │
//!   argument)    transcript) transcript)  ▼
//!                                   verdict/confidence
//! ```
//!
//! Every phase appends exactly one transcript entry: the live reply, the
//! mock reply when no capability is configured, or an `(error)` marker when
//! the call failed. The sequence always runs to the Jury.

pub mod mock;
pub mod orchestrator;
pub mod prompts;
pub mod state;

pub use mock::MockScript;
pub use orchestrator::{
    OrchestratorConfig, OrchestratorError, OrchestratorResult, PhaseSettings, TurnOrchestrator,
};
pub use prompts::build_prompt;
pub use state::{error_marker, Phase, PhaseResult, ReplySource, ERROR_MARKER_PREFIX};
