//! Courtroom phases and per-phase results.

use serde::{Deserialize, Serialize};

use crate::events::StreamEvent;
use crate::session::Speaker;
use crate::verdict::{parse_verdict, Verdict};

/// Highest confidence a jury result can carry.
pub const MAX_CONFIDENCE: u8 = 100;

/// One of the three fixed agent turns, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    /// Opposing counsel challenges the user's argument.
    Opposing,
    /// Judge rules on the exchange so far.
    Judge,
    /// Jury returns a structured verdict line.
    Jury,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 3] = [Phase::Opposing, Phase::Judge, Phase::Jury];

    /// The phase that follows this one, if any.
    pub fn next(self) -> Option<Phase> {
        match self {
            Self::Opposing => Some(Self::Judge),
            Self::Judge => Some(Self::Jury),
            Self::Jury => None,
        }
    }

    /// Whether this is the last phase of a sequence.
    pub fn is_final(self) -> bool {
        self.next().is_none()
    }

    /// Transcript speaker for this phase's output.
    pub fn speaker(self) -> Speaker {
        match self {
            Self::Opposing => Speaker::Opposing,
            Self::Judge => Speaker::Judge,
            Self::Jury => Speaker::Jury,
        }
    }

    /// Whether this phase's output carries a verdict line.
    pub fn carries_verdict(self) -> bool {
        self == Self::Jury
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opposing => write!(f, "Opposing"),
            Self::Judge => write!(f, "Judge"),
            Self::Jury => write!(f, "Jury"),
        }
    }
}

/// Where a phase's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    /// Produced by the live capability.
    Live,
    /// Deterministic canned text; the capability is unavailable.
    Mock,
    /// The call failed; the text is an error marker.
    Failed,
}

impl std::fmt::Display for ReplySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Mock => write!(f, "mock"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Prefix shared by all error-marker texts.
pub const ERROR_MARKER_PREFIX: &str = "(error)";

/// Error-marker text for a failed phase.
pub fn error_marker(phase: Phase, error: &dyn std::fmt::Display) -> String {
    format!("{ERROR_MARKER_PREFIX} {phase}: {error}")
}

fn clamp_confidence(raw: u16) -> u8 {
    u8::try_from(raw.min(u16::from(MAX_CONFIDENCE))).unwrap_or(MAX_CONFIDENCE)
}

/// Result of one phase of one sequence invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseResult {
    /// Which agent produced the text.
    pub agent: Phase,
    /// Reply text, mock text, or error marker.
    pub text: String,
    /// Parsed jury verdict, if the text carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    /// Parsed jury confidence (0–100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    /// Origin of `text`.
    pub source: ReplySource,
}

impl PhaseResult {
    /// Build a result, parsing the verdict line for the jury phase.
    ///
    /// Confidence above [`MAX_CONFIDENCE`] is clamped.
    pub fn new(agent: Phase, text: impl Into<String>, source: ReplySource) -> Self {
        let text = text.into();
        let parsed = if agent.carries_verdict() {
            parse_verdict(&text)
        } else {
            None
        };
        Self {
            agent,
            verdict: parsed.map(|(v, _)| v),
            confidence: parsed.map(|(_, c)| clamp_confidence(c)),
            text,
            source,
        }
    }

    /// Whether the text is an error marker.
    pub fn is_error(&self) -> bool {
        self.source == ReplySource::Failed
    }

    /// Terminal stream event for this phase.
    pub fn done_event(&self) -> StreamEvent {
        StreamEvent::Done {
            agent: self.agent,
            text: self.text.clone(),
            verdict: self.verdict,
            confidence: self.confidence,
            source: self.source,
        }
    }
}
