//! Message and ConversationSession domain types.
//!
//! These are the core value objects that flow through the engine:
//! a user sends a message → the risk assessor scores it → the engine
//! generates a reply → the store persists the exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retrieval::Citation;
use crate::risk::RiskSignalBundle;

/// Unique identifier for a coaching session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who sent a message within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The end user
    User,
    /// The coaching assistant
    Assistant,
    /// System instructions / scripted content
    System,
}

/// Rough token estimate: 4 chars ≈ 1 token.
///
/// Used when a vendor does not report usage (scripted replies, user
/// messages). Never returns zero for non-empty text.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    ((text.len() + 3) / 4) as u32
}

/// A single message in a session.
///
/// Messages are append-only: once created, the only permitted mutation
/// is attaching a review note after human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,

    /// The session this message belongs to
    pub session_id: SessionId,

    /// Who sent this message
    pub sender: Sender,

    /// The text content
    pub content: String,

    /// Insertion order within the session, assigned by the store
    #[serde(default)]
    pub seq: u64,

    /// Token count (vendor-reported, or estimated)
    pub token_count: u32,

    /// Sentiment score in [0,1], higher = more negative
    #[serde(default)]
    pub sentiment: f64,

    /// Risk signal snapshot (user messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskSignalBundle>,

    /// Curriculum citations (assistant messages only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,

    /// Note attached during human review
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,

    /// Timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new user message.
    pub fn user(session_id: SessionId, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: MessageId::new(),
            session_id,
            sender: Sender::User,
            token_count: estimate_tokens(&content),
            content,
            seq: 0,
            sentiment: 0.0,
            risk: None,
            citations: Vec::new(),
            review_note: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(session_id: SessionId, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: MessageId::new(),
            session_id,
            sender: Sender::Assistant,
            token_count: estimate_tokens(&content),
            content,
            seq: 0,
            sentiment: 0.0,
            risk: None,
            citations: Vec::new(),
            review_note: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new system message.
    pub fn system(session_id: SessionId, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: MessageId::new(),
            session_id,
            sender: Sender::System,
            token_count: estimate_tokens(&content),
            content,
            seq: 0,
            sentiment: 0.0,
            risk: None,
            citations: Vec::new(),
            review_note: None,
            created_at: Utc::now(),
        }
    }

    /// Attach risk metadata (builder-style, used on user messages).
    pub fn with_risk(mut self, risk: RiskSignalBundle) -> Self {
        self.sentiment = risk.sentiment;
        self.risk = Some(risk);
        self
    }

    /// Attach citations (builder-style, used on assistant messages).
    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    /// Override the estimated token count with a vendor-reported one.
    pub fn with_token_count(mut self, tokens: u32) -> Self {
        self.token_count = tokens;
        self
    }
}

/// A coaching session: an ordered sequence of messages with rolling
/// summaries and a cumulative token counter.
///
/// Invariants:
/// - at most one open session per user (enforced by the store)
/// - `total_tokens` is monotonically non-decreasing
/// - closing sets `ended_at` once and freezes totals
/// - messages with `seq < folded_seq` are represented only by
///   `long_term_summary` in the prompt path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    /// Unique session ID
    pub id: SessionId,

    /// The user this session belongs to
    pub user_id: UserId,

    /// When this session was opened
    pub started_at: DateTime<Utc>,

    /// Set exactly once when the session is closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Rolling summary of the most recent fold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,

    /// Consolidated summary of all folded history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_term_summary: Option<String>,

    /// Cumulative token count across all messages, monotonic
    #[serde(default)]
    pub total_tokens: u64,

    /// Number of messages appended, monotonic
    #[serde(default)]
    pub message_count: u64,

    /// Messages below this seq have been folded into the summary
    #[serde(default)]
    pub folded_seq: u64,
}

impl ConversationSession {
    /// Create a new open session for a user.
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            started_at: Utc::now(),
            ended_at: None,
            context_summary: None,
            long_term_summary: None,
            total_tokens: 0,
            message_count: 0,
            folded_seq: 0,
        }
    }

    /// Whether the session is still open.
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}
