//! The crisis risk assessor — a pure, synchronous multi-signal scorer.
//!
//! `assess` reads only its arguments and the loaded policy: no clock,
//! no I/O, no hidden state. Identical inputs always produce identical
//! bundles, which is what makes the safety behavior reproducible in
//! tests and auditable against a pinned policy version.
//!
//! Signals:
//! - keyword: capped sum of matched rule-tier weights
//! - sentiment: negative-lexicon count normalized by message length
//! - temporal: fraction of the recent message window matching any rule
//! - contextual: late-night and declining-engagement boosts
//! - negation: whole-composite multiplier when a recovery/negation
//!   phrase is present, so explicit mentions still partially register
//! - prior flag: constant additive term for escalation history
//!
//! An explicit-tier match floors the pre-negation score at the policy's
//! `explicit_floor`: an unambiguous self-harm statement must never
//! score below the escalation band, whatever the other signals say.

use sherpa_config::RiskPolicy;
use sherpa_core::risk::{RiskSignalBundle, UserContext};
use std::collections::HashSet;

/// Deterministic, input-only crisis scorer.
pub struct RiskAssessor {
    policy: RiskPolicy,
    lexicon: HashSet<String>,
}

impl RiskAssessor {
    /// Create an assessor from a loaded policy.
    pub fn new(policy: RiskPolicy) -> Self {
        let lexicon = policy
            .negative_lexicon
            .iter()
            .map(|w| w.to_lowercase())
            .collect();
        Self { policy, lexicon }
    }

    /// The active policy.
    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    /// Score a message against its recent history and user context.
    ///
    /// `recent_history` holds the user's prior messages in this
    /// session, oldest first.
    pub fn assess(
        &self,
        message: &str,
        recent_history: &[String],
        user_context: &UserContext,
    ) -> RiskSignalBundle {
        let normalized = normalize(message);

        let (keyword, explicit_hit) = self.keyword_score(&normalized);
        let sentiment = self.sentiment_score(&normalized);
        let temporal = self.temporal_score(&normalized, recent_history);
        let contextual = self.contextual_score(user_context);

        let negation_multiplier = if self.matches_negation(&normalized) {
            self.policy.negation_multiplier
        } else {
            1.0
        };

        let prior_flag_boost = if user_context.prior_escalations > 0 {
            self.policy.prior_flag_boost
        } else {
            0.0
        };

        let w = &self.policy.weights;
        let mut base = keyword * w.keyword
            + sentiment * w.sentiment
            + temporal * w.temporal
            + contextual * w.contextual;
        if explicit_hit {
            base = base.max(self.policy.explicit_floor);
        }

        let composite = clamp01(base * negation_multiplier + prior_flag_boost);

        RiskSignalBundle {
            keyword,
            sentiment,
            temporal,
            negation_multiplier,
            contextual,
            prior_flag_boost,
            composite,
        }
    }

    /// Capped sum of matched tier weights, plus whether an explicit
    /// tier matched.
    fn keyword_score(&self, normalized: &str) -> (f64, bool) {
        let mut score = 0.0;
        let mut explicit_hit = false;

        for tier in &self.policy.keyword_tiers {
            for phrase in &tier.phrases {
                if normalized.contains(phrase.as_str()) {
                    score += tier.weight;
                    if tier.explicit {
                        explicit_hit = true;
                    }
                }
            }
        }

        (clamp01(score), explicit_hit)
    }

    /// Negative-lexicon hits scaled and normalized by word count.
    fn sentiment_score(&self, normalized: &str) -> f64 {
        let words: Vec<&str> = normalized.split_whitespace().collect();
        if words.is_empty() {
            return 0.0;
        }

        let negatives = words.iter().filter(|w| self.lexicon.contains(**w)).count();
        clamp01(negatives as f64 * self.policy.sentiment_scale / words.len() as f64)
    }

    /// Fraction of the recent window (including the current message)
    /// matching any keyword rule.
    fn temporal_score(&self, normalized_current: &str, recent_history: &[String]) -> f64 {
        let prior_window = self.policy.temporal_window.saturating_sub(1);
        let start = recent_history.len().saturating_sub(prior_window);
        let window = &recent_history[start..];

        let mut considered = 1usize;
        let mut matching = if self.matches_any_rule(normalized_current) {
            1usize
        } else {
            0
        };

        for text in window {
            considered += 1;
            if self.matches_any_rule(&normalize(text)) {
                matching += 1;
            }
        }

        matching as f64 / considered as f64
    }

    /// Additive contextual boosts, clamped to [0,1].
    fn contextual_score(&self, user_context: &UserContext) -> f64 {
        let mut score = 0.0;

        if let Some(hour) = user_context.local_hour {
            if is_late_night(hour, self.policy.late_night_start, self.policy.late_night_end) {
                score += self.policy.late_night_score;
            }
        }

        if user_context.declining_engagement {
            score += self.policy.declining_engagement_score;
        }

        clamp01(score)
    }

    fn matches_any_rule(&self, normalized: &str) -> bool {
        self.policy
            .keyword_tiers
            .iter()
            .any(|tier| tier.phrases.iter().any(|p| normalized.contains(p.as_str())))
    }

    fn matches_negation(&self, normalized: &str) -> bool {
        self.policy
            .negation_patterns
            .iter()
            .any(|p| normalized.contains(p.as_str()))
    }
}

/// Lowercase, strip punctuation except apostrophes, collapse
/// whitespace. Phrase tables are written against this form.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() || c == '\'' {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `hour` falls in the late-night range, wrapping midnight.
fn is_late_night(hour: u8, start: u8, end: u8) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
