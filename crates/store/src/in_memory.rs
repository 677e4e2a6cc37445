//! In-memory backend — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use sherpa_core::error::StoreError;
use sherpa_core::escalation::{EscalationRecord, EscalationStatus};
use sherpa_core::message::{ConversationSession, Message, MessageId, SessionId, UserId};
use sherpa_core::store::{EscalationStore, SessionStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An in-memory store backed by Vecs behind RwLocks.
/// Enforces the same invariants as the SQLite backend.
pub struct InMemoryStore {
    sessions: Arc<RwLock<Vec<ConversationSession>>>,
    messages: Arc<RwLock<Vec<Message>>>,
    escalations: Arc<RwLock<Vec<EscalationRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
            messages: Arc::new(RwLock::new(Vec::new())),
            escalations: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn open(&self, user_id: UserId) -> Result<ConversationSession, StoreError> {
        let mut sessions = self.sessions.write().await;

        // One open session per user: a second open returns the
        // existing one.
        if let Some(existing) = sessions
            .iter()
            .find(|s| s.user_id == user_id && s.is_open())
        {
            return Ok(existing.clone());
        }

        let session = ConversationSession::new(user_id);
        sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<ConversationSession>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn append(
        &self,
        session_id: SessionId,
        mut message: Message,
    ) -> Result<Message, StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(StoreError::SessionNotFound(session_id.0))?;

        if !session.is_open() {
            return Err(StoreError::SessionClosed(session_id.0));
        }

        message.session_id = session_id;
        message.seq = session.message_count;

        // Counters are additive and monotonic, never overwritten
        session.message_count += 1;
        session.total_tokens += u64::from(message.token_count);

        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn history(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read().await;
        let mut history: Vec<Message> = messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        history.sort_by_key(|m| m.seq);

        if history.len() > limit {
            history.drain(..history.len() - limit);
        }
        Ok(history)
    }

    async fn close(&self, session_id: SessionId) -> Result<ConversationSession, StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(StoreError::SessionNotFound(session_id.0))?;

        // Closing twice is a no-op returning the frozen session
        if session.is_open() {
            session.ended_at = Some(Utc::now());
        }
        Ok(session.clone())
    }

    async fn record_fold(
        &self,
        session_id: SessionId,
        folded_seq: u64,
        context_summary: String,
        long_term_summary: String,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(StoreError::SessionNotFound(session_id.0))?;

        if folded_seq < session.folded_seq {
            return Err(StoreError::Storage(format!(
                "folded_seq may not move backwards: {} -> {}",
                session.folded_seq, folded_seq
            )));
        }

        session.folded_seq = folded_seq;
        session.context_summary = Some(context_summary);
        session.long_term_summary = Some(long_term_summary);
        Ok(())
    }

    async fn attach_review_note(
        &self,
        message_id: MessageId,
        note: &str,
    ) -> Result<(), StoreError> {
        let mut messages = self.messages.write().await;
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(StoreError::MessageNotFound(message_id.0))?;
        message.review_note = Some(note.to_string());
        Ok(())
    }
}

#[async_trait]
impl EscalationStore for InMemoryStore {
    async fn insert(&self, record: EscalationRecord) -> Result<EscalationRecord, StoreError> {
        let mut escalations = self.escalations.write().await;

        // Mirrors the SQLite unique index on message_id
        if escalations.iter().any(|r| r.message_id == record.message_id) {
            return Err(StoreError::Storage(format!(
                "escalation already exists for message {}",
                record.message_id
            )));
        }

        escalations.push(record.clone());
        Ok(record)
    }

    async fn get_escalation(&self, id: Uuid) -> Result<Option<EscalationRecord>, StoreError> {
        Ok(self
            .escalations
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn find_by_message(
        &self,
        message_id: MessageId,
    ) -> Result<Option<EscalationRecord>, StoreError> {
        Ok(self
            .escalations
            .read()
            .await
            .iter()
            .find(|r| r.message_id == message_id)
            .cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        next: EscalationStatus,
    ) -> Result<EscalationRecord, StoreError> {
        let mut escalations = self.escalations.write().await;
        let record = escalations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::EscalationNotFound(id))?;

        if !record.status.can_transition(next) {
            return Err(StoreError::InvalidTransition {
                from: record.status.to_string(),
                to: next.to_string(),
            });
        }

        record.status = next;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}
