//! History summarization — keeps prompt size bounded without losing
//! continuity across long-running coaching relationships.
//!
//! When a session crosses the configured message or token thresholds,
//! the turns older than the keep-window are folded into the session's
//! `long_term_summary`. The fold is a deterministic salient-fact
//! extraction (goals stated, risk history, key preferences) — verbatim
//! turns are dropped from the prompt path but remain in the store.

use sherpa_config::SummarizeConfig;
use sherpa_core::error::StoreError;
use sherpa_core::message::{ConversationSession, Message, Sender, SessionId};
use sherpa_core::store::SessionStore;
use tracing::{debug, info};

/// Composite scores at or above this count as elevated when folding
/// risk history into the summary.
const ELEVATED_RISK: f64 = 0.5;

/// Result of a fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldOutcome {
    /// How many turns were folded out of the verbatim window
    pub folded_turns: usize,
    /// The new fold pointer
    pub folded_seq: u64,
}

/// Threshold-triggered history folding.
pub struct Summarizer {
    config: SummarizeConfig,
}

impl Summarizer {
    pub fn new(config: SummarizeConfig) -> Self {
        Self { config }
    }

    /// Whether this session is due for a fold.
    pub fn should_fold(&self, session: &ConversationSession) -> bool {
        if !self.config.enabled || !session.is_open() {
            return false;
        }

        let unfolded = session.message_count.saturating_sub(session.folded_seq);
        if unfolded <= self.config.keep_recent as u64 {
            return false;
        }

        unfolded >= self.config.fold_after_messages
            || session.total_tokens >= self.config.fold_after_tokens
    }

    /// Fold the session's oldest unfolded turns if a threshold has
    /// been crossed. Returns `None` when nothing was folded.
    pub async fn maybe_fold(
        &self,
        store: &dyn SessionStore,
        session_id: SessionId,
    ) -> Result<Option<FoldOutcome>, StoreError> {
        let session = store
            .get_session(session_id)
            .await?
            .ok_or(StoreError::SessionNotFound(session_id.0))?;

        if !self.should_fold(&session) {
            return Ok(None);
        }

        let history = store.history(session_id, usize::MAX).await?;
        let cutoff = session.message_count - self.config.keep_recent as u64;
        let foldable: Vec<&Message> = history
            .iter()
            .filter(|m| m.seq >= session.folded_seq && m.seq < cutoff)
            .collect();

        if foldable.is_empty() {
            return Ok(None);
        }

        let digest = extract_salient(&foldable);
        let long_term = match &session.long_term_summary {
            Some(existing) => merge_summaries(existing, &digest),
            None => digest.clone(),
        };
        let context = format!(
            "Earlier in this session ({} turns summarized):\n{digest}",
            foldable.len()
        );

        store
            .record_fold(session_id, cutoff, context, long_term)
            .await?;

        info!(
            session_id = %session_id,
            folded_turns = foldable.len(),
            folded_seq = cutoff,
            "Folded session history into long-term summary"
        );

        Ok(Some(FoldOutcome {
            folded_turns: foldable.len(),
            folded_seq: cutoff,
        }))
    }
}

/// Extract the facts worth carrying forward from folded turns.
fn extract_salient(messages: &[&Message]) -> String {
    let mut lines: Vec<String> = Vec::new();

    let mut elevated_risk_turns = 0usize;
    for message in messages {
        if let Some(risk) = &message.risk {
            if risk.composite >= ELEVATED_RISK {
                elevated_risk_turns += 1;
            }
        }

        if message.sender != Sender::User {
            continue;
        }

        let lower = message.content.to_lowercase();
        for marker in ["my goal", "i want to", "i'm trying to", "i am trying to"] {
            if lower.contains(marker) {
                lines.push(format!("- Goal: {}", snippet(&message.content)));
                break;
            }
        }
        for marker in ["i prefer", "i like", "works best for me"] {
            if lower.contains(marker) {
                lines.push(format!("- Preference: {}", snippet(&message.content)));
                break;
            }
        }
    }

    if elevated_risk_turns > 0 {
        lines.push(format!(
            "- Risk history: {elevated_risk_turns} turn(s) showed elevated risk signals"
        ));
    }

    if lines.is_empty() {
        lines.push(format!("- Discussed {} coaching turns", messages.len()));
    }

    debug!(salient_lines = lines.len(), "Extracted salient facts");
    lines.join("\n")
}

/// Merge a new digest into the existing summary, skipping exact
/// duplicate lines.
fn merge_summaries(existing: &str, digest: &str) -> String {
    let mut merged = existing.to_string();
    for line in digest.lines() {
        if !existing.lines().any(|l| l == line) {
            merged.push('\n');
            merged.push_str(line);
        }
    }
    merged
}

/// First 120 chars of a message, on a char boundary.
fn snippet(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= 120 {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(117).collect();
        format!("{cut}...")
    }
}
