//! # Sherpa Engine
//!
//! The coaching safety and orchestration engine: receives a user's
//! chat message, decides whether it signals psychological crisis,
//! grounds a generated reply in curriculum content, and reliably
//! produces that reply despite unreliable model vendors.
//!
//! The engine is dependency-injected: construct it from a config plus
//! store, search, and router collaborators, one instance per
//! deployment configuration.

pub mod citations;
pub mod context;
pub mod engine;
pub mod retriever;

pub use context::{AssembledPrompt, ContextAssembler};
pub use engine::{ChatRequest, CoachingEngine, EngineReply};
pub use retriever::{ContentRetriever, InMemoryCurriculum};
