//! Error types for the Sherpa domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Sherpa operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Input validation ---
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // --- Redaction ---
    #[error("Redaction error: {0}")]
    Redaction(#[from] RedactionError),

    // --- Escalation queue ---
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Faults raised by model vendors.
///
/// The transient/permanent split drives the router's retry policy:
/// transient faults are retried on the same vendor, permanent faults
/// skip straight to failover.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Request to '{provider}' timed out after {after_ms}ms")]
    Timeout { provider: String, after_ms: u64 },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether this fault is worth retrying on the same provider.
    ///
    /// Timeouts, rate limits, network faults, and 5xx responses are
    /// transient. Auth failures and malformed requests will fail again
    /// no matter how often they are retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_) | Self::InvalidRequest(_) | Self::NotConfigured(_) => {
                false
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    #[error("Session is closed: {0}")]
    SessionClosed(uuid::Uuid),

    #[error("Message not found: {0}")]
    MessageNotFound(uuid::Uuid),

    #[error("Escalation record not found: {0}")]
    EscalationNotFound(uuid::Uuid),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Rejections raised before any processing happens.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Message too long: {len} chars (max {max})")]
    MessageTooLong { len: usize, max: usize },
}

/// Raised when PII redaction cannot be verified complete.
///
/// The queue fails closed on this: content is withheld and only
/// metadata is persisted.
#[derive(Debug, Clone, Error)]
pub enum RedactionError {
    #[error("Redaction could not be verified: residual '{detector}' match")]
    Unverifiable { detector: String },
}

/// Faults writing to the escalation queue. Non-fatal to the response
/// path: the engine logs these and carries on.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue write failed: {0}")]
    Write(#[from] StoreError),
}
