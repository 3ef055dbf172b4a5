//! Event sinks: where a streaming sequence pushes its events.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use super::types::StreamEvent;

/// Failure to deliver an event. The orchestrator logs and drops these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("sink closed")]
    Closed,

    #[error("sink delivery failed: {0}")]
    Failed(String),
}

/// Receives stream events, in order, from a running sequence.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: StreamEvent) -> Result<(), SinkError>;
}

impl<F> EventSink for F
where
    F: Fn(StreamEvent) -> Result<(), SinkError> + Send + Sync,
{
    fn deliver(&self, event: StreamEvent) -> Result<(), SinkError> {
        self(event)
    }
}

impl EventSink for mpsc::UnboundedSender<StreamEvent> {
    fn deliver(&self, event: StreamEvent) -> Result<(), SinkError> {
        self.send(event).map_err(|_| SinkError::Closed)
    }
}

/// Sink that buffers every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events delivered so far.
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn into_events(self) -> Vec<StreamEvent> {
        self.events
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for CollectingSink {
    fn deliver(&self, event: StreamEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::courtroom::Phase;

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::Delta {
            agent: Phase::Opposing,
            delta: text.to_string(),
        }
    }

    #[test]
    fn test_collecting_sink_preserves_order() {
        let sink = CollectingSink::new();
        sink.deliver(delta("a")).unwrap();
        sink.deliver(delta("b")).unwrap();
        let texts: Vec<_> = sink
            .into_events()
            .iter()
            .filter_map(|e| e.delta_text().map(str::to_string))
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_closure_sink() {
        let sink = |event: StreamEvent| {
            if event.delta_text() == Some("bad") {
                Err(SinkError::Failed("rejected".into()))
            } else {
                Ok(())
            }
        };
        assert!(sink.deliver(delta("ok")).is_ok());
        assert_eq!(
            sink.deliver(delta("bad")),
            Err(SinkError::Failed("rejected".into()))
        );
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.deliver(delta("x")).unwrap();
        assert_eq!(rx.recv().await, Some(delta("x")));
        drop(rx);
        assert_eq!(tx.deliver(delta("y")), Err(SinkError::Closed));
    }

    #[test]
    fn test_automock_sink() {
        let mut sink = MockEventSink::new();
        sink.expect_deliver()
            .times(1)
            .returning(|_| Err(SinkError::Closed));
        assert_eq!(sink.deliver(delta("x")), Err(SinkError::Closed));
    }
}
