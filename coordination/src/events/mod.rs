//! Stream events and the sinks that carry them.
//!
//! A streaming sequence pushes [`StreamEvent`]s into a caller-supplied
//! [`EventSink`]. Sinks are provided for closures, unbounded Tokio channels,
//! an in-memory buffer, and a broadcast [`EventBus`] shared across sessions.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│  EventSink   │────▶│  Transport   │
//! │  (deliver)   │     │ (per session)│     │ (NDJSON/SSE) │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │ BusSink
//!                             ▼
//!                      ┌──────────────┐
//!                      │  Event Bus   │
//!                      │ (broadcast)  │
//!                      └──────────────┘
//! ```
//!
//! Per phase the sink sees zero or more `delta` events followed by exactly
//! one terminal `done` (or `error`) event.

pub mod bus;
pub mod sink;
pub mod types;

pub use bus::{BusSink, EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use sink::{CollectingSink, EventSink, SinkError};
pub use types::{SessionEvent, StreamEvent};
