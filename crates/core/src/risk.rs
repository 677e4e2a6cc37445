//! Risk signal value objects.
//!
//! A `RiskSignalBundle` is the per-message snapshot produced by the
//! risk assessor. It is a deterministic function of its inputs — no
//! hidden state, no clock reads, no network — so scoring is exactly
//! reproducible in tests.

use serde::{Deserialize, Serialize};

/// Per-message snapshot of every crisis signal plus the composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSignalBundle {
    /// Capped sum of matched keyword-rule weights, in [0,1]
    pub keyword: f64,

    /// Lexicon polarity count normalized by message length, in [0,1],
    /// higher = more negative
    pub sentiment: f64,

    /// Fraction of the recent message window matching any crisis rule
    pub temporal: f64,

    /// Applied to the whole weighted sum: the configured suppression
    /// factor when a negation/recovery phrase is present, else 1.0
    pub negation_multiplier: f64,

    /// Additive boosts for late-night activity and declining engagement
    pub contextual: f64,

    /// Constant additive term for prior escalation history
    pub prior_flag_boost: f64,

    /// Weighted, clamped aggregate in [0,1]
    pub composite: f64,
}

impl RiskSignalBundle {
    /// Band the composite score against the given thresholds.
    pub fn level(&self, thresholds: &RiskThresholds) -> RiskLevel {
        RiskLevel::from_score(self.composite, thresholds)
    }
}

/// Composite-score bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No crisis indication; generation proceeds normally
    Normal,
    /// Logged for monitoring; generation proceeds
    Medium,
    /// Escalated and short-circuited: no vendor call is made
    High,
}

impl RiskLevel {
    /// Band a composite score.
    pub fn from_score(composite: f64, thresholds: &RiskThresholds) -> Self {
        if composite >= thresholds.high {
            Self::High
        } else if composite >= thresholds.medium {
            Self::Medium
        } else {
            Self::Normal
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Banding thresholds. Policy, not code: loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Composite at or above this is High
    pub high: f64,
    /// Composite at or above this (but below `high`) is Medium
    pub medium: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            high: 0.8,
            medium: 0.5,
        }
    }
}

/// Caller-supplied facts about the user, read by the assessor and the
/// context assembler.
///
/// `local_hour` is the user's local hour-of-day resolved by the caller,
/// so the assessor stays a pure function with no clock access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    /// BCP-47-ish locale tag, used for regional resource lookup
    pub locale: String,

    /// Lessons the user has completed
    #[serde(default)]
    pub completed_lessons: u32,

    /// Current level or track label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Short description of recent activity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_activity: Option<String>,

    /// Stated preferences
    #[serde(default)]
    pub preferences: Vec<String>,

    /// Number of prior escalations for this user
    #[serde(default)]
    pub prior_escalations: u32,

    /// User's local hour of day (0–23), if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_hour: Option<u8>,

    /// Whether engagement has been declining
    #[serde(default)]
    pub declining_engagement: bool,
}

impl Default for UserContext {
    fn default() -> Self {
        Self {
            locale: "en-US".into(),
            completed_lessons: 0,
            level: None,
            recent_activity: None,
            preferences: Vec::new(),
            prior_escalations: 0,
            local_hour: None,
            declining_engagement: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banding_uses_thresholds() {
        let t = RiskThresholds::default();
        assert_eq!(RiskLevel::from_score(0.85, &t), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.8, &t), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.79, &t), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.5, &t), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.49, &t), RiskLevel::Normal);
        assert_eq!(RiskLevel::from_score(0.0, &t), RiskLevel::Normal);
    }

    #[test]
    fn custom_thresholds_respected() {
        let t = RiskThresholds {
            high: 0.9,
            medium: 0.25,
        };
        assert_eq!(RiskLevel::from_score(0.85, &t), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.3, &t), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.2, &t), RiskLevel::Normal);
    }

    #[test]
    fn bundle_serialization_roundtrip() {
        let bundle = RiskSignalBundle {
            keyword: 1.0,
            sentiment: 0.6,
            temporal: 0.4,
            negation_multiplier: 1.0,
            contextual: 0.0,
            prior_flag_boost: 0.0,
            composite: 0.84,
        };
        let json = serde_json::to_string(&bundle).unwrap();
        let back: RiskSignalBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bundle);
    }
}
