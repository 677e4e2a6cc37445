//! Safety subsystem for Sherpa: crisis risk assessment, PII
//! redaction, the escalation queue, and regional resource lookup.
//!
//! Everything here sits on the critical safety path. The assessor is a
//! pure function of its inputs and the loaded policy; the queue fails
//! closed whenever redaction cannot be verified.

pub mod escalation;
pub mod redact;
pub mod resources;
pub mod risk;

pub use escalation::EscalationQueue;
pub use resources::RegionalResources;
pub use risk::RiskAssessor;
