//! Model vendor implementations for Sherpa.
//!
//! All vendors implement the `sherpa_core::Provider` trait. The
//! router walks the configured chain with timeouts, retries, and
//! failover, and always produces an outcome — generated, fallback, or
//! cancelled — never an unhandled fault.

pub mod anthropic;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{FallbackReason, GenerationOutcome, VendorRouter, build_from_config};
