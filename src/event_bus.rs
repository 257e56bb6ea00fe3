//! Diagnostic event channel for trial execution.
//!
//! Mechanisms and the runner emit structured [`Event`]s through a flume
//! channel owned by the [`EventBus`]. Events are advisory: they never change
//! control flow. Attached [`EventSink`]s receive every drained event, which
//! is how callers observe per-node diagnostics ("mechanism X is not a
//! TERMINAL of the system...") without parsing log output.
//!
//! # Examples
//!
//! ```rust
//! use neurograph::event_bus::{Event, EventBus, MemorySink};
//!
//! let bus = EventBus::default();
//! let sink = MemorySink::new();
//! bus.add_sink(sink.clone());
//!
//! bus.sender()
//!     .send(Event::diagnostic("graph", "build complete"))
//!     .unwrap();
//! bus.drain();
//! assert_eq!(sink.events().len(), 1);
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::{NodeId, Phase};

/// A single diagnostic event emitted during graph construction or execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Event {
    /// Emitted by (or on behalf of) one mechanism during a trial.
    Node {
        when: DateTime<Utc>,
        node: NodeId,
        trial: u64,
        phase: Phase,
        scope: String,
        message: String,
    },
    /// Emitted by the builder or runner itself.
    Diagnostic {
        when: DateTime<Utc>,
        scope: String,
        message: String,
    },
}

impl Event {
    /// Create a node-scoped event.
    pub fn node(
        node: NodeId,
        trial: u64,
        phase: Phase,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Node {
            when: Utc::now(),
            node,
            trial,
            phase,
            scope: scope.into(),
            message: message.into(),
        }
    }

    /// Create a builder/runner-scoped event.
    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic {
            when: Utc::now(),
            scope: scope.into(),
            message: message.into(),
        }
    }

    /// The event's scope label.
    #[must_use]
    pub fn scope(&self) -> &str {
        match self {
            Event::Node { scope, .. } | Event::Diagnostic { scope, .. } => scope,
        }
    }

    /// The event's human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Event::Node { message, .. } | Event::Diagnostic { message, .. } => message,
        }
    }
}

/// Receives drained events. Implementations must tolerate being called from
/// the runner's barrier, i.e. stay non-blocking.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &Event);
}

/// Sink that accumulates events in memory. Cloning shares the buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything handled so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn handle(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

/// Sink that forwards events to `tracing` at debug level.
#[derive(Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn handle(&self, event: &Event) {
        tracing::debug!(scope = event.scope(), "{}", event.message());
    }
}

/// Channel plus sink registry the runner drains at each trial boundary.
///
/// The bus is cheap to clone handles out of: mechanisms only ever hold the
/// [`flume::Sender`], obtained via [`sender`](Self::sender).
pub struct EventBus {
    tx: flume::Sender<Event>,
    rx: flume::Receiver<Event>,
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            sinks: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl EventBus {
    /// Build a bus with an initial set of sinks.
    #[must_use]
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        let bus = Self::default();
        *bus.sinks.lock() = sinks;
        bus
    }

    /// Sender handle for emitting events.
    #[must_use]
    pub fn sender(&self) -> flume::Sender<Event> {
        self.tx.clone()
    }

    /// Attach an additional sink.
    pub fn add_sink(&self, sink: impl EventSink + 'static) {
        self.sinks.lock().push(Box::new(sink));
    }

    /// Flush every queued event through the attached sinks.
    ///
    /// Returns the number of events drained.
    pub fn drain(&self) -> usize {
        let sinks = self.sinks.lock();
        let mut count = 0;
        while let Ok(event) = self.rx.try_recv() {
            for sink in sinks.iter() {
                sink.handle(&event);
            }
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_forwards_to_all_sinks() {
        let bus = EventBus::default();
        let a = MemorySink::new();
        let b = MemorySink::new();
        bus.add_sink(a.clone());
        bus.add_sink(b.clone());

        bus.sender()
            .send(Event::node("x".into(), 0, Phase::Processing, "test", "ran"))
            .unwrap();
        assert_eq!(bus.drain(), 1);
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
        assert_eq!(a.events()[0].scope(), "test");
    }
}
