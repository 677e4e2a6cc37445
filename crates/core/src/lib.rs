//! # Sherpa Core
//!
//! Domain types, traits, and error definitions for the Sherpa coaching
//! safety and orchestration engine. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod escalation;
pub mod event;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod risk;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{
    Error, ProviderError, QueueError, RedactionError, Result, StoreError, ValidationError,
};
pub use escalation::{EscalationPriority, EscalationRecord, EscalationStatus, Hotline};
pub use event::{DomainEvent, EventBus};
pub use message::{
    ConversationSession, Message, MessageId, Sender, SessionId, UserId, estimate_tokens,
};
pub use provider::{GenerationReply, GenerationRequest, Provider, Turn};
pub use retrieval::{Citation, ContentSearch, CurriculumItem, LessonExcerpt, SearchQuery};
pub use risk::{RiskLevel, RiskSignalBundle, RiskThresholds, UserContext};
pub use store::{EscalationStore, SessionStore};
