//! Session records: title, pinned facts, and the append-only transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque session identifier (UUID v4 string).
pub type SessionId = String;

/// Who said a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    /// The human presenting the case.
    User,
    /// Opposing counsel agent.
    Opposing,
    /// Judge agent.
    Judge,
    /// Jury agent.
    Jury,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Opposing => write!(f, "Opposing"),
            Self::Judge => write!(f, "Judge"),
            Self::Jury => write!(f, "Jury"),
        }
    }
}

/// A single `(speaker, text)` transcript line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

impl TranscriptEntry {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }
}

/// A courtroom session.
///
/// `facts` is fixed at creation and included verbatim in every phase prompt.
/// `transcript` only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: SessionId,
    /// Case title.
    pub title: String,
    /// Pinned facts, treated as ground truth for the whole session.
    pub facts: String,
    /// Ordered transcript, insertion order significant.
    pub transcript: Vec<TranscriptEntry>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with an empty transcript.
    pub fn new(id: &str, title: &str, facts: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            facts: facts.to_string(),
            transcript: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Render the transcript as `Speaker: text` lines.
    pub fn render_transcript(&self) -> String {
        render_transcript(&self.transcript)
    }

    /// Number of transcript entries.
    pub fn turn_count(&self) -> usize {
        self.transcript.len()
    }

    /// Compact listing view.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            turns: self.transcript.len(),
            created_at: self.created_at,
        }
    }
}

/// Render transcript entries as newline-separated `Speaker: text` lines.
pub fn render_transcript(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.speaker, e.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Listing view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub turns: usize,
    pub created_at: DateTime<Utc>,
}
