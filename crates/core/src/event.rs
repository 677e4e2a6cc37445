//! Domain event system — decoupled monitoring surface.
//!
//! Events are published when something operationally interesting
//! happens. Monitoring components subscribe without coupling the
//! engine to any metrics backend. Notably, a lost escalation write is
//! its own event so it can be alerted on as a distinct failure
//! surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::risk::RiskLevel;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A message was scored by the risk assessor
    MessageAssessed {
        session_id: String,
        level: RiskLevel,
        composite: f64,
        timestamp: DateTime<Utc>,
    },

    /// An escalation record was enqueued for human review
    EscalationEnqueued {
        record_id: String,
        priority: String,
        redacted: bool,
        timestamp: DateTime<Utc>,
    },

    /// An escalation record could not be written — high-severity:
    /// the user still got a safety reply, but review lost the record
    EscalationWriteFailed {
        message_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A provider was abandoned and the next one in the chain tried
    ProviderFailedOver {
        from: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Every provider was exhausted; a scripted fallback was served
    FallbackServed {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A reply was generated successfully
    ReplyGenerated {
        session_id: String,
        provider: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// Old session history was folded into the long-term summary
    SessionSummarized {
        session_id: String,
        folded_turns: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components subscribe to receive all events and filter for what they
/// care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
