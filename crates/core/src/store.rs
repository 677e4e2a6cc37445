//! Persistence traits — session/message lifecycle and escalation
//! records.
//!
//! Implementations: SQLite (production), in-memory (tests, ephemeral
//! deployments). All backends must enforce the "at most one open
//! session per user" constraint and keep session counters monotonic:
//! token totals only accumulate, `ended_at` only moves from None to
//! Some, `folded_seq` only advances.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::escalation::{EscalationRecord, EscalationStatus};
use crate::message::{ConversationSession, Message, MessageId, SessionId, UserId};

/// Session and message lifecycle.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Open a session for a user, or return the existing open one.
    ///
    /// A second `open` while a session is open MUST return that session
    /// rather than creating another.
    async fn open(&self, user_id: UserId) -> std::result::Result<ConversationSession, StoreError>;

    /// Fetch a session by ID.
    async fn get_session(
        &self,
        id: SessionId,
    ) -> std::result::Result<Option<ConversationSession>, StoreError>;

    /// Append a message to an open session.
    ///
    /// Assigns the message's `seq`, increments the session's message
    /// count, and accumulates its token counter additively. Returns the
    /// message as stored. Fails on a closed session.
    async fn append(
        &self,
        session_id: SessionId,
        message: Message,
    ) -> std::result::Result<Message, StoreError>;

    /// The most recent `limit` messages of a session, oldest first.
    async fn history(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> std::result::Result<Vec<Message>, StoreError>;

    /// Close a session, setting `ended_at` and freezing totals.
    ///
    /// Closing an already-closed session is a no-op that returns the
    /// frozen session.
    async fn close(
        &self,
        session_id: SessionId,
    ) -> std::result::Result<ConversationSession, StoreError>;

    /// Record a summarization fold.
    ///
    /// `folded_seq` must not move backwards; a lower value than the
    /// session's current one is rejected.
    async fn record_fold(
        &self,
        session_id: SessionId,
        folded_seq: u64,
        context_summary: String,
        long_term_summary: String,
    ) -> std::result::Result<(), StoreError>;

    /// Attach a review note to a message — the only permitted mutation
    /// of a message after creation.
    async fn attach_review_note(
        &self,
        message_id: MessageId,
        note: &str,
    ) -> std::result::Result<(), StoreError>;
}

/// Escalation record persistence.
#[async_trait]
pub trait EscalationStore: Send + Sync {
    /// Insert a new record.
    async fn insert(
        &self,
        record: EscalationRecord,
    ) -> std::result::Result<EscalationRecord, StoreError>;

    /// Fetch a record by ID.
    async fn get_escalation(
        &self,
        id: Uuid,
    ) -> std::result::Result<Option<EscalationRecord>, StoreError>;

    /// Find the record created for a given message, if any.
    ///
    /// Backs the at-most-once-per-message guarantee.
    async fn find_by_message(
        &self,
        message_id: MessageId,
    ) -> std::result::Result<Option<EscalationRecord>, StoreError>;

    /// Apply a review status transition.
    ///
    /// Only the legal `Pending → InReview → {Completed, Escalated}`
    /// moves are accepted; anything else is `InvalidTransition`. This
    /// is the human-review collaborator's entry point — the engine
    /// never calls it.
    async fn transition(
        &self,
        id: Uuid,
        next: EscalationStatus,
    ) -> std::result::Result<EscalationRecord, StoreError>;
}
