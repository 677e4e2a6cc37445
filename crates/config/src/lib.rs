//! Configuration loading, validation, and management for Sherpa.
//!
//! Loads configuration from `~/.sherpa/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! The risk policy tables live here deliberately: keyword tiers,
//! sentiment lexicon, negation patterns, weights, and thresholds are
//! safety policy, not incidental logic. They ship as versioned,
//! auditable configuration that can be tuned without redeploying code.

use serde::{Deserialize, Serialize};
use sherpa_core::risk::RiskThresholds;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.sherpa/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default max tokens per generated reply
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Maximum accepted message length in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Conversation turns included in the prompt window
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Ordered vendor chain, first entry tried first
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderEntry>,

    /// Crisis scoring policy
    #[serde(default)]
    pub risk: RiskPolicy,

    /// Curriculum retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// History summarization settings
    #[serde(default)]
    pub summarize: SummarizeConfig,

    /// Scripted reply templates
    #[serde(default)]
    pub replies: RepliesConfig,

    /// Regional crisis resources
    #[serde(default)]
    pub resources: ResourcesConfig,
}

fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_message_chars() -> usize {
    4000
}
fn default_history_turns() -> usize {
    10
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_max_tokens", &self.default_max_tokens)
            .field("default_temperature", &self.default_temperature)
            .field("max_message_chars", &self.max_message_chars)
            .field("history_turns", &self.history_turns)
            .field("providers", &self.providers)
            .field("risk", &self.risk)
            .field("retrieval", &self.retrieval)
            .field("summarize", &self.summarize)
            .field("replies", &self.replies)
            .field("resources", &self.resources)
            .finish()
    }
}

/// One vendor in the ordered failover chain.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Provider kind: "anthropic" is native, anything else is treated
    /// as an OpenAI-compatible endpoint
    pub name: String,

    /// Model to request from this vendor
    pub model: String,

    /// Per-provider API key (falls back to the top-level key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Custom base URL (proxies, self-hosted endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Hard per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries on transient faults before failing over
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    250
}

fn default_providers() -> Vec<ProviderEntry> {
    vec![
        ProviderEntry {
            name: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            api_key: None,
            api_url: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        },
        ProviderEntry {
            name: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key: None,
            api_url: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        },
    ]
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("backoff_ms", &self.backoff_ms)
            .finish()
    }
}

/// A weighted tier of crisis keyword rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordTier {
    /// Tier label for audit trails
    pub label: String,

    /// Weight added per matched phrase (capped sum, clamped to 1.0)
    pub weight: f64,

    /// Phrases matched as substrings of the normalized message
    pub phrases: Vec<String>,

    /// Explicit tiers floor the pre-negation score at
    /// `explicit_floor`: an unambiguous self-harm statement must never
    /// score below the escalation band
    #[serde(default)]
    pub explicit: bool,
}

/// Relative weights of the risk signals. Must sum to something
/// sensible (validated at load).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalWeights {
    pub keyword: f64,
    pub sentiment: f64,
    pub temporal: f64,
    pub contextual: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            keyword: 0.4,
            sentiment: 0.2,
            temporal: 0.2,
            contextual: 0.1,
        }
    }
}

/// The full crisis scoring policy. Versioned so audits can pin exact
/// behavior to a policy release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// Policy version tag
    #[serde(default = "default_policy_version")]
    pub version: String,

    /// Keyword rule tiers
    #[serde(default = "default_keyword_tiers")]
    pub keyword_tiers: Vec<KeywordTier>,

    /// Single-word negative sentiment lexicon
    #[serde(default = "default_negative_lexicon")]
    pub negative_lexicon: Vec<String>,

    /// Scale applied to the per-word negative count
    #[serde(default = "default_sentiment_scale")]
    pub sentiment_scale: f64,

    /// Phrases that suppress the composite (negation / recovery)
    #[serde(default = "default_negation_patterns")]
    pub negation_patterns: Vec<String>,

    /// Multiplier applied to the whole weighted sum when a negation
    /// pattern is present
    #[serde(default = "default_negation_multiplier")]
    pub negation_multiplier: f64,

    /// Signal weights
    #[serde(default)]
    pub weights: SignalWeights,

    /// Banding thresholds
    #[serde(default)]
    pub thresholds: RiskThresholds,

    /// Pre-negation floor applied when an explicit tier matches
    #[serde(default = "default_explicit_floor")]
    pub explicit_floor: f64,

    /// Composite at or above this gets Urgent review priority
    #[serde(default = "default_urgent_threshold")]
    pub urgent_threshold: f64,

    /// Messages considered in the temporal window (including current)
    #[serde(default = "default_temporal_window")]
    pub temporal_window: usize,

    /// Contextual score contribution for late-night activity
    #[serde(default = "default_context_boost")]
    pub late_night_score: f64,

    /// Hour range treated as late night (inclusive start, exclusive
    /// end, wrapping midnight)
    #[serde(default = "default_late_night_start")]
    pub late_night_start: u8,
    #[serde(default = "default_late_night_end")]
    pub late_night_end: u8,

    /// Contextual score contribution for declining engagement
    #[serde(default = "default_context_boost")]
    pub declining_engagement_score: f64,

    /// Additive composite boost for users with escalation history
    #[serde(default = "default_prior_flag_boost")]
    pub prior_flag_boost: f64,
}

fn default_policy_version() -> String {
    "2026.1".into()
}
fn default_sentiment_scale() -> f64 {
    5.0
}
fn default_negation_multiplier() -> f64 {
    0.3
}
fn default_explicit_floor() -> f64 {
    0.9
}
fn default_urgent_threshold() -> f64 {
    0.9
}
fn default_temporal_window() -> usize {
    5
}
fn default_context_boost() -> f64 {
    0.5
}
fn default_late_night_start() -> u8 {
    23
}
fn default_late_night_end() -> u8 {
    5
}
fn default_prior_flag_boost() -> f64 {
    0.15
}

fn default_keyword_tiers() -> Vec<KeywordTier> {
    vec![
        KeywordTier {
            label: "explicit".into(),
            weight: 1.0,
            explicit: true,
            phrases: vec![
                "kill myself".into(),
                "end my life".into(),
                "end it all".into(),
                "take my own life".into(),
                "want to die".into(),
                "suicide".into(),
                "suicidal".into(),
                "hurt myself".into(),
                "harm myself".into(),
                "self harm".into(),
            ],
        },
        KeywordTier {
            label: "severe".into(),
            weight: 0.6,
            explicit: false,
            phrases: vec![
                "no reason to live".into(),
                "can't go on".into(),
                "cant go on".into(),
                "give up on life".into(),
                "no way out".into(),
                "better off without me".into(),
                "nothing matters anymore".into(),
            ],
        },
        KeywordTier {
            label: "moderate".into(),
            weight: 0.4,
            explicit: false,
            phrases: vec![
                "hopeless".into(),
                "worthless".into(),
                "can't cope".into(),
                "cant cope".into(),
                "falling apart".into(),
                "breaking down".into(),
            ],
        },
        KeywordTier {
            label: "mild".into(),
            weight: 0.2,
            explicit: false,
            phrases: vec![
                "overwhelmed".into(),
                "exhausted".into(),
                "burned out".into(),
                "burnt out".into(),
                "so stressed".into(),
                "can't sleep".into(),
                "cant sleep".into(),
            ],
        },
    ]
}

fn default_negative_lexicon() -> Vec<String> {
    [
        "overwhelmed",
        "hopeless",
        "worthless",
        "exhausted",
        "anxious",
        "depressed",
        "miserable",
        "lonely",
        "alone",
        "empty",
        "numb",
        "scared",
        "afraid",
        "crying",
        "pain",
        "hurt",
        "hurting",
        "kill",
        "die",
        "dying",
        "death",
        "suicide",
        "suicidal",
        "trapped",
        "burden",
        "failure",
        "useless",
        "pointless",
        "awful",
        "terrible",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_negation_patterns() -> Vec<String> {
    [
        "don't want",
        "dont want",
        "do not want",
        "don't really",
        "not going to",
        "would never",
        "no longer",
        "used to feel",
        "feeling better",
        "feel better",
        "doing better",
        "on the mend",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            version: default_policy_version(),
            keyword_tiers: default_keyword_tiers(),
            negative_lexicon: default_negative_lexicon(),
            sentiment_scale: default_sentiment_scale(),
            negation_patterns: default_negation_patterns(),
            negation_multiplier: default_negation_multiplier(),
            weights: SignalWeights::default(),
            thresholds: RiskThresholds::default(),
            explicit_floor: default_explicit_floor(),
            urgent_threshold: default_urgent_threshold(),
            temporal_window: default_temporal_window(),
            late_night_score: default_context_boost(),
            late_night_start: default_late_night_start(),
            late_night_end: default_late_night_end(),
            declining_engagement_score: default_context_boost(),
            prior_flag_boost: default_prior_flag_boost(),
        }
    }
}

/// Curriculum retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum excerpts included in a prompt
    #[serde(default = "default_retrieval_limit")]
    pub limit: usize,

    /// Minimum term length extracted from the message (exclusive)
    #[serde(default = "default_min_term_len")]
    pub min_term_len: usize,

    /// Maximum terms in one query
    #[serde(default = "default_max_terms")]
    pub max_terms: usize,

    /// Characters of lesson body included per excerpt
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

fn default_retrieval_limit() -> usize {
    5
}
fn default_min_term_len() -> usize {
    3
}
fn default_max_terms() -> usize {
    10
}
fn default_excerpt_chars() -> usize {
    400
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_retrieval_limit(),
            min_term_len: default_min_term_len(),
            max_terms: default_max_terms(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

/// History summarization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeConfig {
    /// Whether summarization is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fold when unfolded message count reaches this
    #[serde(default = "default_fold_after_messages")]
    pub fold_after_messages: u64,

    /// Fold when the session token counter reaches this
    #[serde(default = "default_fold_after_tokens")]
    pub fold_after_tokens: u64,

    /// Recent messages kept verbatim after a fold
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
}

fn default_fold_after_messages() -> u64 {
    30
}
fn default_fold_after_tokens() -> u64 {
    24_000
}
fn default_keep_recent() -> usize {
    12
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fold_after_messages: default_fold_after_messages(),
            fold_after_tokens: default_fold_after_tokens(),
            keep_recent: default_keep_recent(),
        }
    }
}

/// Scripted reply templates — policy wording, shipped as data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepliesConfig {
    /// Supportive reply used when the high-risk path short-circuits.
    /// Regional resources are appended below it.
    #[serde(default = "default_crisis_reply")]
    pub crisis: String,

    /// Generic reply served when every vendor is exhausted
    #[serde(default = "default_fallback_reply")]
    pub fallback: String,
}

fn default_crisis_reply() -> String {
    "Thank you for telling me. What you're feeling matters, and you don't \
     have to face it alone. I'm a coaching assistant and not able to give \
     you the support you deserve right now — please reach out to someone \
     who can:"
        .into()
}

fn default_fallback_reply() -> String {
    "I'm having trouble generating a response right now. Your message has \
     been saved — please try again in a moment."
        .into()
}

impl Default for RepliesConfig {
    fn default() -> Self {
        Self {
            crisis: default_crisis_reply(),
            fallback: default_fallback_reply(),
        }
    }
}

/// A configured hotline entry (mirrors `sherpa_core::Hotline`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotlineEntry {
    pub name: String,
    pub contact: String,
}

/// Regional crisis resource tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Locale used when the user's locale has no entry
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Locale → hotline list
    #[serde(default = "default_regions")]
    pub regions: HashMap<String, Vec<HotlineEntry>>,
}

fn default_locale() -> String {
    "en-US".into()
}

fn default_regions() -> HashMap<String, Vec<HotlineEntry>> {
    let mut regions = HashMap::new();
    regions.insert(
        "en-US".into(),
        vec![
            HotlineEntry {
                name: "988 Suicide & Crisis Lifeline".into(),
                contact: "Call or text 988".into(),
            },
            HotlineEntry {
                name: "Crisis Text Line".into(),
                contact: "Text HOME to 741741".into(),
            },
        ],
    );
    regions.insert(
        "en-GB".into(),
        vec![HotlineEntry {
            name: "Samaritans".into(),
            contact: "Call 116 123".into(),
        }],
    );
    regions.insert(
        "en-AU".into(),
        vec![HotlineEntry {
            name: "Lifeline Australia".into(),
            contact: "Call 13 11 14".into(),
        }],
    );
    regions
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            default_locale: default_locale(),
            regions: default_regions(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.sherpa/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `SHERPA_API_KEY` (highest priority)
    /// - `ANTHROPIC_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("SHERPA_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sherpa")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.providers.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one provider must be configured".into(),
            ));
        }

        let t = &self.risk.thresholds;
        if !(0.0..=1.0).contains(&t.high) || !(0.0..=1.0).contains(&t.medium) || t.medium > t.high {
            return Err(ConfigError::ValidationError(
                "risk thresholds must satisfy 0 <= medium <= high <= 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.risk.negation_multiplier) {
            return Err(ConfigError::ValidationError(
                "negation_multiplier must be within [0, 1]".into(),
            ));
        }

        let w = &self.risk.weights;
        if w.keyword + w.sentiment + w.temporal + w.contextual <= 0.0 {
            return Err(ConfigError::ValidationError(
                "risk signal weights must sum to a positive value".into(),
            ));
        }

        if self.risk.keyword_tiers.is_empty() {
            return Err(ConfigError::ValidationError(
                "risk policy must define at least one keyword tier".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_max_tokens: default_max_tokens(),
            default_temperature: default_temperature(),
            max_message_chars: default_max_message_chars(),
            history_turns: default_history_turns(),
            providers: default_providers(),
            risk: RiskPolicy::default(),
            retrieval: RetrievalConfig::default(),
            summarize: SummarizeConfig::default(),
            replies: RepliesConfig::default(),
            resources: ResourcesConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
