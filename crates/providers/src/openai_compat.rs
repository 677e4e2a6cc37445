//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI,
//! Fireworks AI, and any endpoint exposing `/v1/chat/completions`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sherpa_core::error::ProviderError;
use sherpa_core::message::Sender;
use sherpa_core::provider::{GenerationReply, GenerationRequest, Provider, Turn};
use tracing::{debug, warn};

/// An OpenAI-compatible model provider.
///
/// This handles the vast majority of vendors since most expose an
/// OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        // No client-level timeout: the router owns the per-attempt
        // deadline.
        let client = reqwest::Client::new();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key, model)
    }

    /// Convert prompt turns to the chat completions message format.
    /// The system prompt is prepended as a system message.
    fn to_api_messages(system_prompt: &str, turns: &[Turn]) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ApiMessage {
            role: "system".into(),
            content: system_prompt.to_string(),
        });
        for t in turns {
            messages.push(ApiMessage {
                role: match t.sender {
                    Sender::Assistant => "assistant".into(),
                    Sender::System => "system".into(),
                    Sender::User => "user".into(),
                },
                content: t.text.clone(),
            });
        }
        messages
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationReply, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.system_prompt, &request.turns),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": false,
        });

        debug!(provider = %self.name, model = %self.model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
                "Invalid API key or insufficient permissions".into(),
            ));
        }
        if status == 400 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::InvalidRequest(error_body));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let usage = api_response.usage.unwrap_or_default();

        Ok(GenerationReply {
            text: choice.message.content.unwrap_or_default(),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }
}

// --- OpenAI-compatible API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_trims_trailing_slash() {
        let provider =
            OpenAiCompatProvider::new("together", "https://api.together.xyz/v1/", "key", "llama");
        assert_eq!(provider.base_url, "https://api.together.xyz/v1");
        assert_eq!(provider.name(), "together");
    }

    #[test]
    fn system_prompt_prepended() {
        let msgs = OpenAiCompatProvider::to_api_messages(
            "You are a coach",
            &[Turn::user("help"), Turn::assistant("sure")],
        );
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[0].content, "You are a coach");
        assert_eq!(msgs[1].role, "user");
        assert_eq!(msgs[2].role, "assistant");
    }

    #[test]
    fn parse_response() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini",
                "choices": [
                    {"index": 0, "message": {"role": "assistant", "content": "Small steps win."}, "finish_reason": "stop"}
                ],
                "usage": {"prompt_tokens": 80, "completion_tokens": 12, "total_tokens": 92}
            }"#,
        )
        .unwrap();

        let choice = &resp.choices[0];
        assert_eq!(choice.message.content.as_deref(), Some("Small steps win."));
        assert_eq!(resp.usage.unwrap().prompt_tokens, 80);
    }

    #[test]
    fn parse_response_without_usage() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "ok"}}]}"#,
        )
        .unwrap();
        assert!(resp.usage.is_none());
    }
}
