//! Escalation records — the hand-off to human review.
//!
//! Records are created by the engine when a message crosses the high
//! risk threshold, and from then on are mutated only by the human
//! review collaborator through the store's transition operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{MessageId, SessionId, UserId};

/// Review priority, assigned from the composite score at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationPriority {
    High,
    Urgent,
}

impl std::fmt::Display for EscalationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// Review status machine: `Pending → InReview → {Completed, Escalated}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    InReview,
    Completed,
    Escalated,
}

impl EscalationStatus {
    /// Whether moving to `next` is a legal transition.
    pub fn can_transition(self, next: EscalationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InReview)
                | (Self::InReview, Self::Completed)
                | (Self::InReview, Self::Escalated)
        )
    }
}

impl std::fmt::Display for EscalationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InReview => write!(f, "in_review"),
            Self::Completed => write!(f, "completed"),
            Self::Escalated => write!(f, "escalated"),
        }
    }
}

/// A regional crisis resource suggested alongside an escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotline {
    /// Resource name (e.g., a crisis line)
    pub name: String,
    /// How to reach it (number, text code, URL)
    pub contact: String,
}

/// A redacted hand-off record for human review.
///
/// `excerpt` is always PII-redacted; it is `None` when redaction could
/// not be verified complete (fail closed — metadata only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    /// Unique record ID
    pub id: Uuid,

    /// The user whose message triggered the escalation
    pub user_id: UserId,

    /// The session containing the triggering message
    pub session_id: SessionId,

    /// The triggering message
    pub message_id: MessageId,

    /// PII-redacted message excerpt, withheld if unverifiable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,

    /// Suggested regional resources for the reviewer
    #[serde(default)]
    pub resources: Vec<Hotline>,

    /// Review priority
    pub priority: EscalationPriority,

    /// Review status
    pub status: EscalationStatus,

    /// Composite risk score at enqueue time
    pub composite_score: f64,

    /// Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscalationRecord {
    /// Create a new pending record.
    pub fn new(
        user_id: UserId,
        session_id: SessionId,
        message_id: MessageId,
        priority: EscalationPriority,
        composite_score: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            session_id,
            message_id,
            excerpt: None,
            resources: Vec::new(),
            priority,
            status: EscalationStatus::Pending,
            composite_score,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use EscalationStatus::*;
        assert!(Pending.can_transition(InReview));
        assert!(InReview.can_transition(Completed));
        assert!(InReview.can_transition(Escalated));
    }

    #[test]
    fn illegal_transitions() {
        use EscalationStatus::*;
        assert!(!Pending.can_transition(Completed));
        assert!(!Pending.can_transition(Escalated));
        assert!(!Completed.can_transition(InReview));
        assert!(!Escalated.can_transition(Pending));
        assert!(!InReview.can_transition(Pending));
        assert!(!Pending.can_transition(Pending));
    }

    #[test]
    fn new_record_is_pending() {
        let record = EscalationRecord::new(
            UserId::new(),
            SessionId::new(),
            MessageId::new(),
            EscalationPriority::Urgent,
            0.93,
        );
        assert_eq!(record.status, EscalationStatus::Pending);
        assert!(record.excerpt.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn status_serde_snake_case() {
        let json = serde_json::to_string(&EscalationStatus::InReview).unwrap();
        assert_eq!(json, "\"in_review\"");
    }
}
