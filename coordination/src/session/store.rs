//! In-memory session store.
//!
//! One shared map from session id to an individually locked record, so
//! appends to different sessions never contend on the same lock. Each record
//! also carries an async turn lock that the orchestrator holds for the length
//! of a sequence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;
use uuid::Uuid;

use super::types::{Session, SessionId, SessionSummary, Speaker, TranscriptEntry};

/// Error type for session store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
}

/// Result type for session store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to SessionStore
pub type SharedSessionStore = Arc<SessionStore>;

/// Per-turn serialization guard for one session.
pub type TurnLock = Arc<tokio::sync::Mutex<()>>;

struct SessionRecord {
    session: Mutex<Session>,
    turn_lock: TurnLock,
}

impl SessionRecord {
    fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            turn_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// Process-lifetime session store.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<SessionRecord>>>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedSessionStore {
        Arc::new(self)
    }

    /// Allocate a fresh session and return its id. Never fails.
    pub fn create(&self, title: &str, facts: &str) -> SessionId {
        let id = Uuid::new_v4().to_string();
        let record = Arc::new(SessionRecord::new(Session::new(&id, title, facts)));
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), record);
        debug!(session_id = %id, title, "session created");
        id
    }

    /// Snapshot of a session, or `None` if the id is unknown.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.record(id).ok().map(|r| r.with_session(|s| s.clone()))
    }

    /// Whether a session exists.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Append a user presentation to the transcript.
    pub fn append_user_text(&self, id: &str, text: &str) -> StoreResult<()> {
        self.append(id, Speaker::User, text)
    }

    /// Append a `(speaker, text)` entry to the transcript.
    pub fn append(&self, id: &str, speaker: Speaker, text: &str) -> StoreResult<()> {
        let record = self.record(id)?;
        let len = record.with_session(|s| {
            s.transcript.push(TranscriptEntry::new(speaker, text));
            s.transcript.len()
        });
        debug!(session_id = id, %speaker, transcript_len = len, "transcript appended");
        Ok(())
    }

    /// Pinned facts for a session.
    pub fn facts(&self, id: &str) -> StoreResult<String> {
        Ok(self.record(id)?.with_session(|s| s.facts.clone()))
    }

    /// Transcript snapshot for a session.
    pub fn transcript(&self, id: &str) -> StoreResult<Vec<TranscriptEntry>> {
        Ok(self.record(id)?.with_session(|s| s.transcript.clone()))
    }

    /// Transcript rendered as `Speaker: text` lines.
    pub fn render_transcript(&self, id: &str) -> StoreResult<String> {
        Ok(self.record(id)?.with_session(|s| s.render_transcript()))
    }

    /// Turn lock for a session; held by the orchestrator for a whole sequence.
    pub fn turn_lock(&self, id: &str) -> StoreResult<TurnLock> {
        Ok(Arc::clone(&self.record(id)?.turn_lock))
    }

    /// Summaries of all sessions, oldest first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let records: Vec<Arc<SessionRecord>> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut summaries: Vec<SessionSummary> = records
            .iter()
            .map(|r| r.with_session(|s| s.summary()))
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    /// Number of sessions held.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, id: &str) -> StoreResult<Arc<SessionRecord>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }
}
