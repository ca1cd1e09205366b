//! # Event Bus System
//!
//! Provides an event-driven architecture for the live-album engine using
//! `tokio::sync::broadcast`. Hosts subscribe to learn about definition
//! changes, reconciliation results and scheduler activity without polling.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies per concern
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │ Def. Store  ├──────────────>│           │
//! └─────────────┘               │           │
//!                               │ EventBus  │
//! ┌─────────────┐     emit      │ (broadcast│     subscribe    ┌────────────┐
//! │ Reconciler  ├──────────────>│  channel) ├─────────────────>│ Subscriber │
//! └─────────────┘               │           │                  └────────────┘
//!                               │           │
//! ┌─────────────┐     emit      │           │     subscribe    ┌────────────┐
//! │ Scheduler   ├──────────────>│           ├─────────────────>│ Subscriber │
//! └─────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SchedulerEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Scheduler(SchedulerEvent::Started { interval_secs: 3600 }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Scheduler(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishers ignore the "no subscribers" error with `.ok()`: events are
//! advisory and never gate engine behavior.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Definition lifecycle events
    Definition(DefinitionEvent),
    /// Per-definition reconciliation results
    Reconcile(ReconcileEvent),
    /// Scheduler and sweep events
    Scheduler(SchedulerEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Definition(e) => e.description(),
            CoreEvent::Reconcile(e) => e.description(),
            CoreEvent::Scheduler(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Reconcile(ReconcileEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Reconcile(ReconcileEvent::Completed { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Scheduler(SchedulerEvent::SweepCompleted { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Reconcile(ReconcileEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Scheduler(SchedulerEvent::SweepCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Definition(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Definition Events
// ============================================================================

/// Events related to creating, changing and removing definitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DefinitionEvent {
    /// A definition was created or updated.
    Saved {
        definition_id: String,
        name: String,
        /// Where the definition lives: "store" or "embedded"
        source: String,
    },
    /// A stored definition was deleted.
    Deleted { definition_id: String, name: String },
    /// Embedded metadata was removed from a collection.
    Unlinked { collection_id: String },
}

impl DefinitionEvent {
    fn description(&self) -> &str {
        match self {
            DefinitionEvent::Saved { .. } => "Definition saved",
            DefinitionEvent::Deleted { .. } => "Definition deleted",
            DefinitionEvent::Unlinked { .. } => "Live album unlinked",
        }
    }
}

// ============================================================================
// Reconcile Events
// ============================================================================

/// Events describing the result of reconciling one definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ReconcileEvent {
    /// Reconciliation ran to completion (possibly with per-asset failures).
    Completed {
        definition_id: String,
        collection_id: String,
        /// Outcome status name, e.g. "applied" or "no-change"
        status: String,
        added: u64,
        removed: u64,
        /// Assets that failed to add or remove
        failed: u64,
    },
    /// Reconciliation aborted before or during mutation.
    Failed {
        definition_id: String,
        /// Machine-readable error kind
        kind: String,
        message: String,
    },
}

impl ReconcileEvent {
    fn description(&self) -> &str {
        match self {
            ReconcileEvent::Completed { .. } => "Definition reconciled",
            ReconcileEvent::Failed { .. } => "Reconciliation failed",
        }
    }
}

// ============================================================================
// Scheduler Events
// ============================================================================

/// Events emitted by the periodic scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SchedulerEvent {
    /// Periodic trigger registered.
    Started { interval_secs: u64 },
    /// Periodic trigger removed.
    Stopped,
    /// A sweep began.
    SweepStarted {
        /// "timer" or "manual"
        trigger: String,
    },
    /// A sweep finished or was cancelled.
    SweepCompleted {
        total: u64,
        reconciled: u64,
        failed: u64,
        cancelled: bool,
        duration_ms: u64,
    },
}

impl SchedulerEvent {
    fn description(&self) -> &str {
        match self {
            SchedulerEvent::Started { .. } => "Scheduler started",
            SchedulerEvent::Stopped => "Scheduler stopped",
            SchedulerEvent::SweepStarted { .. } => "Sweep started",
            SchedulerEvent::SweepCompleted { .. } => "Sweep completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let reconcile_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Reconcile(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match the predicate will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(failed: u64) -> CoreEvent {
        CoreEvent::Reconcile(ReconcileEvent::Completed {
            definition_id: "def-1".to_string(),
            collection_id: "col-1".to_string(),
            status: "applied".to_string(),
            added: 3,
            removed: 1,
            failed,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(CoreEvent::Scheduler(SchedulerEvent::Stopped)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Definition(DefinitionEvent::Saved {
            definition_id: "def-1".to_string(),
            name: "Beach".to_string(),
            source: "store".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Reconcile(_)));

        bus.emit(CoreEvent::Scheduler(SchedulerEvent::SweepStarted {
            trigger: "timer".to_string(),
        }))
        .ok();
        bus.emit(completed(0)).ok();

        assert_eq!(stream.recv().await.unwrap(), completed(0));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for _ in 0..5 {
            bus.emit(completed(0)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(completed(0).severity(), EventSeverity::Info);
        assert_eq!(completed(2).severity(), EventSeverity::Warning);

        let failed = CoreEvent::Reconcile(ReconcileEvent::Failed {
            definition_id: "def-1".to_string(),
            kind: "search_failed".to_string(),
            message: "catalog unavailable".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let started = CoreEvent::Scheduler(SchedulerEvent::SweepStarted {
            trigger: "manual".to_string(),
        });
        assert_eq!(started.severity(), EventSeverity::Debug);
        assert_eq!(started.description(), "Sweep started");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Scheduler(SchedulerEvent::SweepCompleted {
            total: 4,
            reconciled: 3,
            failed: 1,
            cancelled: false,
            duration_ms: 1200,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Scheduler\""));
        assert!(json.contains("\"event\":\"SweepCompleted\""));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
