//! Session store: per-session title, pinned facts, and transcript.
//!
//! Sessions live for the lifetime of the process. The only mutation is
//! appending transcript entries; nothing is ever truncated or reordered.

pub mod store;
pub mod types;

pub use store::{SessionStore, SharedSessionStore, StoreError, StoreResult, TurnLock};
pub use types::{
    render_transcript, Session, SessionId, SessionSummary, Speaker, TranscriptEntry,
};
