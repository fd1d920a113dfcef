use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{Result, KoseiError};

/// One message of the correction conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// External text-correction collaborator. Implementations must be safe for
/// concurrent calls; the engine imposes no ordering between requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CorrectionService: Send + Sync {
    /// Send a conversation and return the raw response text. Network-level
    /// retry is the implementation's concern; the caller only retries on
    /// semantic (validation) grounds.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatMessage,
}

/// OpenAI-compatible chat completion client with its own bounded
/// exponential-backoff retry policy.
pub struct OpenAiChatService {
    client: Client,
    config: LlmConfig,
    endpoint: String,
}

impl OpenAiChatService {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        let endpoint = normalize_endpoint(&config.endpoint);

        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    async fn request_once(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint);
        debug!("Sending correction request to {}", url);

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
        };

        let mut builder = self.client.post(&url).json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(KoseiError::Correction(format!(
                "Correction API error {}: {}",
                status, error_text
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(KoseiError::Correction(
                "Correction service returned an empty result".to_string(),
            ));
        }

        Ok(content)
    }
}

#[async_trait]
impl CorrectionService for OpenAiChatService {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let attempts = self.config.max_retries.max(1);
        let mut backoff = Duration::from_secs(2);

        for attempt in 1..=attempts {
            match self.request_once(messages).await {
                Ok(content) => return Ok(content),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Correction request failed (attempt {}/{}): {}, retrying in {:?}",
                        attempt, attempts, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("retry loop returns on the final attempt")
    }
}

/// Ensure the endpoint carries an API path: a bare scheme://host gets the
/// conventional `/v1` suffix, anything with an explicit path is kept.
fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');

    let after_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);

    if after_scheme.contains('/') {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint_appends_v1() {
        assert_eq!(
            normalize_endpoint("https://api.openai.com"),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            normalize_endpoint("http://localhost:8000/"),
            "http://localhost:8000/v1"
        );
    }

    #[test]
    fn test_normalize_endpoint_keeps_explicit_path() {
        assert_eq!(
            normalize_endpoint("http://localhost:8000/openai/v1"),
            "http://localhost:8000/openai/v1"
        );
        assert_eq!(
            normalize_endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1"
        );
    }

    #[test]
    fn test_chat_message_roles() {
        assert_eq!(ChatMessage::system("a").role, "system");
        assert_eq!(ChatMessage::user("b").role, "user");
        assert_eq!(ChatMessage::assistant("c").role, "assistant");
    }
}
