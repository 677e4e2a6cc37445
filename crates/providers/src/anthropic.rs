//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible
//! proxy):
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sherpa_core::error::ProviderError;
use sherpa_core::message::Sender;
use sherpa_core::provider::{GenerationReply, GenerationRequest, Provider, Turn};
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider for a configured model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        // No client-level timeout: the router owns the per-attempt
        // deadline and must be the only place it is configured.
        let client = reqwest::Client::new();

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert prompt turns to Anthropic API format.
    fn to_api_messages(turns: &[Turn]) -> Vec<AnthropicMessage> {
        turns
            .iter()
            .map(|t| AnthropicMessage {
                role: match t.sender {
                    Sender::Assistant => "assistant".into(),
                    // System content lives in the top-level field; a
                    // stray system turn is downgraded to user
                    Sender::User | Sender::System => "user".into(),
                },
                content: t.text.clone(),
            })
            .collect()
    }

    /// Convert an Anthropic API response to our reply type.
    fn to_reply(resp: AnthropicResponse) -> Result<GenerationReply, ProviderError> {
        let mut text = String::new();
        for block in &resp.content {
            let ResponseContentBlock::Text { text: t } = block;
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(t);
        }

        Ok(GenerationReply {
            text,
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationReply, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "system": request.system_prompt,
            "messages": Self::to_api_messages(&request.turns),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        debug!(provider = "anthropic", model = %self.model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if status == 400 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::InvalidRequest(error_body));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: AnthropicResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        Self::to_reply(api_resp)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
