//! Broadcast event bus for streaming sequences.
//!
//! Every session's events go through one Tokio broadcast channel; each
//! sequence gets a [`BusSink`] that stamps its session id on the way in.
//! Subscribers filter by session or event type.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::sink::{EventSink, SinkError};
use super::types::{SessionEvent, StreamEvent};
use crate::session::SessionId;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Pub/sub fan-out of session events.
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Bus whose subscribers may lag by at most `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let event_type = event.event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to events matching `filter`.
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Sink that publishes a session's events onto this bus.
    pub fn sink_for(self: &Arc<Self>, session_id: impl Into<SessionId>) -> BusSink {
        BusSink {
            bus: Arc::clone(self),
            session_id: session_id.into(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// [`EventSink`] bound to one session on an [`EventBus`].
#[derive(Clone)]
pub struct BusSink {
    bus: SharedEventBus,
    session_id: SessionId,
}

impl BusSink {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl EventSink for BusSink {
    fn deliver(&self, event: StreamEvent) -> Result<(), SinkError> {
        self.bus
            .publish(SessionEvent::new(self.session_id.clone(), event));
        Ok(())
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub session_id: Option<SessionId>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    pub fn matches(&self, event: &SessionEvent) -> bool {
        if let Some(ref sid) = self.session_id {
            if &event.session_id != sid {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            let event_type = event.event.event_type();
            if !types.iter().any(|t| t == event_type) {
                return false;
            }
        }

        true
    }
}

/// Receiver that only yields events matching its filter.
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<SessionEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<SessionEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<SessionEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::courtroom::{Phase, ReplySource};

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::Delta {
            agent: Phase::Judge,
            delta: text.to_string(),
        }
    }

    fn done() -> StreamEvent {
        StreamEvent::Done {
            agent: Phase::Judge,
            text: "SUSTAINED".to_string(),
            verdict: None,
            confidence: None,
            source: ReplySource::Live,
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(SessionEvent::new("s1", delta("hi")));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.session_id, "s1");
        assert_eq!(received.event, delta("hi"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new().shared();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.sink_for("s1").deliver(delta("x")).is_ok());
    }

    #[tokio::test]
    async fn test_sink_stamps_session() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let sink = bus.sink_for("case-7");
        assert_eq!(sink.session_id(), "case-7");
        sink.deliver(done()).unwrap();

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.session_id, "case-7");
        assert_eq!(e1.event, e2.event);
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new().session("s1").types(vec!["done"]);

        assert!(filter.matches(&SessionEvent::new("s1", done())));
        assert!(!filter.matches(&SessionEvent::new("s2", done())));
        assert!(!filter.matches(&SessionEvent::new("s1", delta("x"))));
        assert!(EventFilter::new().matches(&SessionEvent::new("any", delta("x"))));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().session("target"));

        let publisher = Arc::clone(&bus);
        tokio::spawn(async move {
            publisher.publish(SessionEvent::new("other", delta("skip")));
            publisher.publish(SessionEvent::new("target", delta("keep")));
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.session_id, "target");
        assert_eq!(event.event.delta_text(), Some("keep"));
    }
}
