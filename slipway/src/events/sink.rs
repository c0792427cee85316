//! Event sink trait and implementations.

use async_trait::async_trait;
use tracing::{debug, info, Level};

use super::RunEvent;

/// Trait for sinks that receive run lifecycle events.
///
/// Sinks must never fail the run: emission errors are the sink's problem.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: RunEvent);

    /// Emits an event without blocking. Never panics.
    fn try_emit(&self, event: RunEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: RunEvent) {}

    fn try_emit(&self, _event: RunEvent) {}
}

/// An event sink that logs events through the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub const fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log_event(&self, event: &RunEvent) {
        if self.level == Level::DEBUG {
            debug!(
                event = event.kind(),
                run_id = %event.run_id(),
                detail = ?event,
                "run event"
            );
        } else {
            info!(
                event = event.kind(),
                run_id = %event.run_id(),
                detail = ?event,
                "run event"
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: RunEvent) {
        self.log_event(&event);
    }

    fn try_emit(&self, event: RunEvent) {
        self.log_event(&event);
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<RunEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose kind starts with the given prefix.
    #[must_use]
    pub fn events_of_kind(&self, prefix: &str) -> Vec<RunEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| event.kind().starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: RunEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: RunEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::RunId;

    fn entry_started(entry_id: &str) -> RunEvent {
        RunEvent::EntryStarted {
            run_id: RunId::new(),
            entry_id: entry_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_noop_sink_discards() {
        let sink = NoOpEventSink;
        sink.emit(entry_started("linux")).await;
        sink.try_emit(entry_started("macos"));
    }

    #[tokio::test]
    async fn test_logging_sink_does_not_panic() {
        let sink = LoggingEventSink::default();
        sink.emit(entry_started("linux")).await;
        sink.try_emit(entry_started("macos"));
    }

    #[tokio::test]
    async fn test_collecting_sink_preserves_order() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(entry_started("linux")).await;
        sink.try_emit(entry_started("macos"));

        let events = sink.events();
        assert_eq!(sink.len(), 2);
        assert!(
            matches!(&events[0], RunEvent::EntryStarted { entry_id, .. } if entry_id == "linux")
        );
        assert!(
            matches!(&events[1], RunEvent::EntryStarted { entry_id, .. } if entry_id == "macos")
        );
    }

    #[tokio::test]
    async fn test_collecting_sink_filters_by_kind() {
        let run_id = RunId::new();
        let sink = CollectingEventSink::new();
        sink.emit(entry_started("linux")).await;
        sink.emit(RunEvent::RunCancelled {
            run_id,
            reason: "shutdown".to_string(),
        })
        .await;

        assert_eq!(sink.events_of_kind("entry.").len(), 1);
        assert_eq!(sink.events_of_kind("run.").len(), 1);
    }

    #[tokio::test]
    async fn test_collecting_sink_clear() {
        let sink = CollectingEventSink::new();
        sink.emit(entry_started("linux")).await;
        assert_eq!(sink.len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
