//! Event types for the overlay engine
//!
//! Provides lifecycle notifications and the EventBus used to broadcast
//! them. Events are diagnostics: emission never blocks, and losing events
//! when no subscriber is listening is permitted. Playback completion is
//! deliberately NOT carried here; it is a direct oneshot signal scoped to
//! the placed instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::animation::AnimationType;

/// Why an overlay was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TeardownReason {
    /// A new step arrived and replaced the active overlay
    StepReplaced,
    /// The target container left the frame for a full playback cycle
    DetectionLost,
    /// The host application shut the engine down
    Shutdown,
}

/// Overlay lifecycle events
///
/// Broadcast via [`EventBus`]; exhaustively matched by diagnostic
/// consumers and the integration tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OverlayEvent {
    /// A new step string was accepted and resolution started
    StepSubmitted {
        step_id: Uuid,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// The resolver produced a typed descriptor for the step
    StepResolved {
        step_id: Uuid,
        animation_type: AnimationType,
        /// True when the result came from the per-step memo, not a fresh
        /// inference call
        from_cache: bool,
        timestamp: DateTime<Utc>,
    },

    /// Resolution failed; the step was dropped and nothing is shown
    ResolutionFailed {
        step_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// First confident container detection for the active step
    DetectionConfirmed {
        step_id: Uuid,
        label: String,
        confidence: f32,
        timestamp: DateTime<Utc>,
    },

    /// The overlay entity was attached to the scene
    OverlayPlaced {
        step_id: Uuid,
        animation_type: AnimationType,
        /// True when placement used the view-center fallback anchor
        /// rather than a container-confirmed position
        fallback_anchor: bool,
        timestamp: DateTime<Utc>,
    },

    /// Playback finished with detection still live and restarted
    PlaybackLooped {
        step_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The overlay was removed from the scene
    OverlayTornDown {
        step_id: Uuid,
        reason: TeardownReason,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`OverlayEvent`]
///
/// Thin wrapper over `tokio::sync::broadcast`; cloning shares the
/// underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OverlayEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus buffering up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<OverlayEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers. No subscribers is not an error.
    pub fn emit(&self, event: OverlayEvent) {
        let _ = self.tx.send(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
