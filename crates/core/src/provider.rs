//! Provider trait — the abstraction over model vendors.
//!
//! A Provider knows how to send an assembled prompt to a language model
//! backend and get a reply. The router calls `generate()` without
//! knowing which vendor is behind it — pure polymorphism, so new
//! vendors are added without touching router logic.
//!
//! Implementations: Anthropic-native, OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Sender;

/// One conversation turn in a provider-agnostic prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who spoke this turn (User or Assistant; System content lives in
    /// the request's `system_prompt`)
    pub sender: Sender,

    /// The turn text
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
        }
    }
}

/// A single generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The assembled system instruction
    pub system_prompt: String,

    /// Ordered conversation turns, oldest first
    pub turns: Vec<Turn>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,
}

/// A successful vendor reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReply {
    /// The generated text
    pub text: String,

    /// Prompt-side token usage
    pub input_tokens: u32,

    /// Completion-side token usage
    pub output_tokens: u32,
}

impl GenerationReply {
    /// Total tokens billed for this call.
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete reply.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationReply, ProviderError>;
}
