//! Language model client
//!
//! Provides:
//! - The `LanguageModel` trait consumed by the response generator
//! - An HTTP client for OpenAI-style chat-completions endpoints with
//!   transient/permanent error classification
//! - Output repair for model responses wrapped in markdown fencing

use async_trait::async_trait;
use coursemate_common::config::GenerationConfig;
use coursemate_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Options forwarded with every generation call
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Maximum output tokens
    pub max_tokens: usize,

    /// Sampling temperature (0.0 - 1.0)
    pub temperature: f32,

    /// System prompt override
    pub system_prompt: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.7,
            system_prompt: None,
        }
    }
}

impl From<&GenerationConfig> for GenerationOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: None,
        }
    }
}

/// External generative language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// HTTP client for OpenAI-style chat completions
#[derive(Debug)]
pub struct HttpLanguageModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl HttpLanguageModel {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "generation.api_key is required".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: config.api_base.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: options
                        .system_prompt
                        .clone()
                        .unwrap_or_else(|| "You are a helpful teaching assistant.".to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Generation {
                message: format!("Request failed: {}", e),
                transient: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Rate limits and server errors are worth retrying; the rest are
            // request bugs.
            let transient = status.as_u16() == 429 || status.is_server_error();
            return Err(AppError::Generation {
                message: format!("API error {}: {}", status, body),
                transient,
            });
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| AppError::Generation {
                message: format!("Failed to parse response: {}", e),
                transient: false,
            })?;

        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(AppError::Generation {
                message: "Empty response from language model".to_string(),
                transient: false,
            });
        }

        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Create a language model client from configuration
pub fn create_language_model(config: &GenerationConfig) -> Result<Arc<dyn LanguageModel>> {
    Ok(Arc::new(HttpLanguageModel::new(config)?))
}

/// Strip a markdown code fence wrapping the whole payload, e.g.
/// ```` ```json\n{...}\n``` ````. Returns the input unchanged when no
/// fence is present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the language tag line ("json", "text", or empty)
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };

    let rest = rest.trim_end();
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse structured output, repairing fencing first. `None` means the text
/// should be treated as a plain-text answer, not discarded.
pub fn parse_structured(text: &str) -> Option<serde_json::Value> {
    serde_json::from_str(text.trim())
        .ok()
        .or_else(|| serde_json::from_str(strip_code_fences(text)).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json_parses_like_raw_json() {
        let raw = "{\"plan\":\"read chapter 4\"}";
        let fenced = "```json\n{\"plan\":\"read chapter 4\"}\n```";

        let from_raw = parse_structured(raw).unwrap();
        let from_fenced = parse_structured(fenced).unwrap();
        assert_eq!(from_raw, from_fenced);
    }

    #[test]
    fn test_generic_fence_is_stripped() {
        let fenced = "```\n{\"a\":1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\":1}");
        assert!(parse_structured(fenced).is_some());
    }

    #[test]
    fn test_unfenced_text_is_untouched() {
        assert_eq!(strip_code_fences("  plain answer  "), "plain answer");
    }

    #[test]
    fn test_unparseable_output_is_none_not_error() {
        assert!(parse_structured("just prose, no json").is_none());
    }

    #[test]
    fn test_missing_api_key_is_a_configuration_error() {
        let config = GenerationConfig::default();
        let err = HttpLanguageModel::new(&config).unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
