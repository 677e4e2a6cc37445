//! The escalation queue — redacted hand-off to human review.
//!
//! `enqueue` is called by the engine on the high-risk path. It assigns
//! priority from the composite score, redacts the triggering message,
//! attaches regional resources, and persists at most one record per
//! message. Redaction failures fail closed: the record is written with
//! metadata only, never with unscrubbed content.
//!
//! Status transitions belong to the human-review collaborator via the
//! store's `transition` operation; this queue never mutates status.

use crate::redact;
use crate::resources::RegionalResources;
use sherpa_core::error::QueueError;
use sherpa_core::escalation::{EscalationPriority, EscalationRecord};
use sherpa_core::event::{DomainEvent, EventBus};
use sherpa_core::message::{Message, UserId};
use sherpa_core::risk::RiskSignalBundle;
use sherpa_core::store::EscalationStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Enqueues redacted escalation records for human review.
pub struct EscalationQueue {
    store: Arc<dyn EscalationStore>,
    resources: RegionalResources,
    urgent_threshold: f64,
    events: Arc<EventBus>,
}

impl EscalationQueue {
    /// Create a queue over an escalation store.
    pub fn new(
        store: Arc<dyn EscalationStore>,
        resources: RegionalResources,
        urgent_threshold: f64,
    ) -> Self {
        Self {
            store,
            resources,
            urgent_threshold,
            events: Arc::new(EventBus::default()),
        }
    }

    /// Publish queue events to a shared bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Enqueue a record for the given triggering message.
    ///
    /// Idempotent per message: a second call for the same message ID
    /// returns the existing record instead of creating another.
    pub async fn enqueue(
        &self,
        user_id: UserId,
        message: &Message,
        bundle: &RiskSignalBundle,
        locale: &str,
    ) -> Result<EscalationRecord, QueueError> {
        if let Some(existing) = self.store.find_by_message(message.id).await? {
            info!(
                record_id = %existing.id,
                message_id = %message.id,
                "Escalation already enqueued for message"
            );
            return Ok(existing);
        }

        let priority = if bundle.composite >= self.urgent_threshold {
            EscalationPriority::Urgent
        } else {
            EscalationPriority::High
        };

        let mut record = EscalationRecord::new(
            user_id,
            message.session_id,
            message.id,
            priority,
            bundle.composite,
        );

        // Redaction runs before any persistence. Fail closed: on an
        // unverifiable result the content is withheld and only the
        // metadata ships to review.
        match redact::redact_verified(&message.content) {
            Ok(excerpt) => record.excerpt = Some(excerpt),
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    error = %e,
                    "Redaction unverifiable, withholding escalation content"
                );
                record.excerpt = None;
            }
        }

        record.resources = self.resources.resources_for(locale).to_vec();

        let redacted = record.excerpt.is_some();
        let stored = self.store.insert(record).await?;

        info!(
            record_id = %stored.id,
            priority = %stored.priority,
            score = stored.composite_score,
            "Escalation enqueued for human review"
        );
        self.events.publish(DomainEvent::EscalationEnqueued {
            record_id: stored.id.to_string(),
            priority: stored.priority.to_string(),
            redacted,
            timestamp: chrono::Utc::now(),
        });

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sherpa_config::ResourcesConfig;
    use sherpa_core::error::StoreError;
    use sherpa_core::escalation::EscalationStatus;
    use sherpa_core::message::{MessageId, SessionId};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// In-memory escalation store for queue tests.
    struct MemStore {
        records: Mutex<Vec<EscalationRecord>>,
    }

    impl MemStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
            }
        }

        fn count(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl EscalationStore for MemStore {
        async fn insert(
            &self,
            record: EscalationRecord,
        ) -> std::result::Result<EscalationRecord, StoreError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(record)
        }

        async fn get_escalation(
            &self,
            id: Uuid,
        ) -> std::result::Result<Option<EscalationRecord>, StoreError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned())
        }

        async fn find_by_message(
            &self,
            message_id: MessageId,
        ) -> std::result::Result<Option<EscalationRecord>, StoreError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.message_id == message_id)
                .cloned())
        }

        async fn transition(
            &self,
            _id: Uuid,
            _next: EscalationStatus,
        ) -> std::result::Result<EscalationRecord, StoreError> {
            unimplemented!("not used by queue tests")
        }
    }

    /// A store whose writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl EscalationStore for BrokenStore {
        async fn insert(
            &self,
            _record: EscalationRecord,
        ) -> std::result::Result<EscalationRecord, StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }

        async fn get_escalation(
            &self,
            _id: Uuid,
        ) -> std::result::Result<Option<EscalationRecord>, StoreError> {
            Ok(None)
        }

        async fn find_by_message(
            &self,
            _message_id: MessageId,
        ) -> std::result::Result<Option<EscalationRecord>, StoreError> {
            Ok(None)
        }

        async fn transition(
            &self,
            _id: Uuid,
            _next: EscalationStatus,
        ) -> std::result::Result<EscalationRecord, StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }
    }

    fn queue(store: Arc<dyn EscalationStore>) -> EscalationQueue {
        EscalationQueue::new(
            store,
            RegionalResources::from_config(&ResourcesConfig::default()),
            0.9,
        )
    }

    fn bundle(composite: f64) -> RiskSignalBundle {
        RiskSignalBundle {
            keyword: 1.0,
            sentiment: 0.5,
            temporal: 0.5,
            negation_multiplier: 1.0,
            contextual: 0.0,
            prior_flag_boost: 0.0,
            composite,
        }
    }

    #[tokio::test]
    async fn urgent_priority_at_threshold() {
        let store = Arc::new(MemStore::new());
        let q = queue(store);
        let msg = Message::user(SessionId::new(), "I want to kill myself");

        let record = q
            .enqueue(UserId::new(), &msg, &bundle(0.92), "en-US")
            .await
            .unwrap();
        assert_eq!(record.priority, EscalationPriority::Urgent);
    }

    #[tokio::test]
    async fn high_priority_below_threshold() {
        let store = Arc::new(MemStore::new());
        let q = queue(store);
        let msg = Message::user(SessionId::new(), "I can't go on like this");

        let record = q
            .enqueue(UserId::new(), &msg, &bundle(0.85), "en-US")
            .await
            .unwrap();
        assert_eq!(record.priority, EscalationPriority::High);
    }

    #[tokio::test]
    async fn content_is_redacted_before_persistence() {
        let store = Arc::new(MemStore::new());
        let q = queue(store.clone());
        let msg = Message::user(
            SessionId::new(),
            "I give up, email me at sam@example.com or call 555-123-4567",
        );

        let record = q
            .enqueue(UserId::new(), &msg, &bundle(0.95), "en-US")
            .await
            .unwrap();

        let excerpt = record.excerpt.expect("excerpt should be present");
        assert!(excerpt.contains("[email]"));
        assert!(excerpt.contains("[phone]"));
        assert!(!excerpt.contains("sam@example.com"));

        // Nothing unredacted reached the store either
        let stored = &store.records.lock().unwrap()[0];
        assert!(!stored.excerpt.as_deref().unwrap().contains("555-123"));
    }

    #[tokio::test]
    async fn at_most_once_per_message() {
        let store = Arc::new(MemStore::new());
        let q = queue(store.clone());
        let msg = Message::user(SessionId::new(), "I want to end it all");
        let user = UserId::new();

        let first = q.enqueue(user, &msg, &bundle(0.9), "en-US").await.unwrap();
        let second = q.enqueue(user, &msg, &bundle(0.9), "en-US").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn regional_resources_attached() {
        let store = Arc::new(MemStore::new());
        let q = queue(store);
        let msg = Message::user(SessionId::new(), "I want to end it all");

        let record = q
            .enqueue(UserId::new(), &msg, &bundle(0.9), "en-GB")
            .await
            .unwrap();
        assert!(record.resources.iter().any(|h| h.name.contains("Samaritans")));
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_queue_error() {
        let q = queue(Arc::new(BrokenStore));
        let msg = Message::user(SessionId::new(), "I want to end it all");

        let result = q.enqueue(UserId::new(), &msg, &bundle(0.9), "en-US").await;
        assert!(matches!(result, Err(QueueError::Write(_))));
    }

    #[tokio::test]
    async fn enqueue_event_published() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();

        let q = queue(Arc::new(MemStore::new())).with_events(bus);
        let msg = Message::user(SessionId::new(), "I want to end it all");
        q.enqueue(UserId::new(), &msg, &bundle(0.9), "en-US")
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::EscalationEnqueued {
                priority, redacted, ..
            } => {
                assert_eq!(priority, "urgent");
                assert!(redacted);
            }
            other => panic!("Expected EscalationEnqueued, got {other:?}"),
        }
    }
}
