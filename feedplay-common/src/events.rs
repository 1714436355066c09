//! Event types for the FeedPlay event system
//!
//! Provides the shared event definitions and the EventBus used by the
//! arbiter, its playback clients, and any host-side observers.

use crate::id::ElementId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// FeedPlay event types
///
/// Events are broadcast via EventBus and can be serialized for logging or
/// forwarding to a host UI. Decisions themselves travel on the arbiter's
/// `watch` channel; these events describe what happened and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    /// A playback client registered its element
    ElementRegistered {
        id: ElementId,
        timestamp: DateTime<Utc>,
    },

    /// A playback client unregistered (or its element was dropped)
    ElementUnregistered {
        id: ElementId,
        /// The element held playback when it left
        was_active: bool,
        timestamp: DateTime<Utc>,
    },

    /// Arbitration granted playback to a different element (or to none)
    ActiveChanged {
        previous: Option<ElementId>,
        current: Option<ElementId>,
        timestamp: DateTime<Utc>,
    },

    /// Element left view entirely; user pause / user play pins were reset
    SuppressionCleared {
        id: ElementId,
        timestamp: DateTime<Utc>,
    },

    /// User explicitly started an element
    ManualPlay {
        id: ElementId,
        timestamp: DateTime<Utc>,
    },

    /// User explicitly paused an element
    ManualPause {
        id: ElementId,
        timestamp: DateTime<Utc>,
    },

    /// Media element refused to start; client fell back to paused
    PlaybackRejected {
        id: ElementId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Host application moved to foreground (true) or background (false)
    ForegroundChanged {
        foreground: bool,
        timestamp: DateTime<Utc>,
    },

    /// Shared mute preference changed
    MuteChanged {
        muted: bool,
        timestamp: DateTime<Utc>,
    },
}

impl FeedEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::ElementRegistered { .. } => "ElementRegistered",
            FeedEvent::ElementUnregistered { .. } => "ElementUnregistered",
            FeedEvent::ActiveChanged { .. } => "ActiveChanged",
            FeedEvent::SuppressionCleared { .. } => "SuppressionCleared",
            FeedEvent::ManualPlay { .. } => "ManualPlay",
            FeedEvent::ManualPause { .. } => "ManualPause",
            FeedEvent::PlaybackRejected { .. } => "PlaybackRejected",
            FeedEvent::ForegroundChanged { .. } => "ForegroundChanged",
            FeedEvent::MuteChanged { .. } => "MuteChanged",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            FeedEvent::ElementRegistered { timestamp, .. }
            | FeedEvent::ElementUnregistered { timestamp, .. }
            | FeedEvent::ActiveChanged { timestamp, .. }
            | FeedEvent::SuppressionCleared { timestamp, .. }
            | FeedEvent::ManualPlay { timestamp, .. }
            | FeedEvent::ManualPause { timestamp, .. }
            | FeedEvent::PlaybackRejected { timestamp, .. }
            | FeedEvent::ForegroundChanged { timestamp, .. }
            | FeedEvent::MuteChanged { timestamp, .. } => *timestamp,
        }
    }
}

/// One-to-many event distribution over `tokio::sync::broadcast`
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
pub struct EventBus {
    tx: broadcast::Sender<FeedEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use feedplay_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FeedEvent,
    ) -> Result<usize, broadcast::error::SendError<FeedEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// # Examples
    ///
    /// ```
    /// use feedplay_common::events::{EventBus, FeedEvent};
    ///
    /// let event_bus = EventBus::new(16);
    /// event_bus.emit_lossy(FeedEvent::ForegroundChanged {
    ///     foreground: false,
    ///     timestamp: chrono::Utc::now(),
    /// });
    /// ```
    pub fn emit_lossy(&self, event: FeedEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
