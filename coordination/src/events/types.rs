//! Stream events emitted while a sequence runs.
//!
//! Serialised with a `type` tag so a transport can forward them as-is
//! (one JSON object per line, or one SSE `data:` frame each).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::courtroom::{Phase, ReplySource};
use crate::session::SessionId;
use crate::verdict::Verdict;

/// One incremental or terminal event for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A text fragment for `agent`.
    Delta { agent: Phase, delta: String },

    /// The phase finished; `text` is the full reply or an error marker.
    Done {
        agent: Phase,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verdict: Option<Verdict>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<u8>,
        source: ReplySource,
    },

    /// The phase could not start at all.
    Error { agent: Phase, error: String },
}

impl StreamEvent {
    /// Phase this event belongs to.
    pub fn agent(&self) -> Phase {
        match self {
            Self::Delta { agent, .. } | Self::Done { agent, .. } | Self::Error { agent, .. } => {
                *agent
            }
        }
    }

    /// Whether this event closes its phase.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta { .. })
    }

    /// Wire tag of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Delta { .. } => "delta",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Fragment text, for delta events.
    pub fn delta_text(&self) -> Option<&str> {
        match self {
            Self::Delta { delta, .. } => Some(delta),
            _ => None,
        }
    }
}

/// A stream event tagged with the session it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub event: StreamEvent,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(session_id: impl Into<SessionId>, event: StreamEvent) -> Self {
        Self {
            session_id: session_id.into(),
            event,
            timestamp: Utc::now(),
        }
    }
}
