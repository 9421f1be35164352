//! Event sinks for leaderboard domain events.
//!
//! The binary logs every event through tracing; tests swap in the
//! collector and assert on what the engine emitted.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, trace, Level};

use crate::domain::events::DomainEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Emits each event as a tracing record carrying its JSON form.
#[derive(Debug, Clone)]
pub struct LoggingEventPublisher {
    level: Level,
}

impl Default for LoggingEventPublisher {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventPublisher {
    /// Events at debug level
    pub fn new() -> Self {
        Self::default()
    }

    /// Events at `level`; anything above info is logged at info.
    pub fn at_level(level: Level) -> Self {
        Self { level }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let kind = event.event_type();
        let payload = serde_json::to_string(&event)?;

        if self.level == Level::TRACE {
            trace!(kind, event = %payload, "Leaderboard event");
        } else if self.level == Level::DEBUG {
            debug!(kind, event = %payload, "Leaderboard event");
        } else {
            info!(kind, event = %payload, "Leaderboard event");
        }
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

/// Records events in arrival order.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    received: Mutex<Vec<DomainEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far
    pub fn events(&self) -> Vec<DomainEvent> {
        self.received.lock().clone()
    }

    /// How many events of `kind` (e.g. `"ScoreUpdated"`) arrived
    pub fn count(&self, kind: &str) -> usize {
        self.received
            .lock()
            .iter()
            .filter(|event| event.event_type() == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.received.lock().is_empty()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.received.lock().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        self.received.lock().extend(events);
        Ok(())
    }
}
