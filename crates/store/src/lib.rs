//! Persistence backends for Sherpa sessions, messages, and escalation
//! records, plus the history summarizer.
//!
//! Backends implement the `SessionStore` and `EscalationStore` traits
//! from `sherpa_core`. SQLite is the production backend; the in-memory
//! backend backs tests and ephemeral deployments.

pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod summary;

pub use in_memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use summary::{FoldOutcome, Summarizer};
