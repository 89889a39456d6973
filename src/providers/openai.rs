use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;
use crate::providers::TranslationClient;
use crate::translation::batch::BATCH_SEPARATOR;

/// OpenAI-compatible chat-completions client
#[derive(Debug)]
pub struct OpenAiClient {
    /// HTTP client with the per-request timeout baked in
    client: Client,
    /// API key for authentication
    api_key: String,
    /// Base endpoint URL (e.g. https://api.openai.com/v1)
    endpoint: Url,
    /// Model name
    model: String,
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

/// Chat message format
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    role: String,
    /// Content of the message
    content: String,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAiClient {
    /// Create a client from provider configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| ProviderError::Unknown(format!("Invalid endpoint: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ProviderError::from)?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint,
            model: config.model.clone(),
        })
    }

    /// System prompt asking the model to keep the separator and segment count
    fn system_prompt(source_language: &str, target_language: &str) -> String {
        format!(
            "You are a professional subtitle translator. Translate each segment \
             from {src} to {tgt}. Segments are separated by the token {sep}. \
             Reply with exactly the same number of segments, in the same order, \
             separated by the same {sep} token. Return only the translations, \
             no explanations.",
            src = source_language,
            tgt = target_language,
            sep = BATCH_SEPARATOR,
        )
    }

    fn completions_url(&self) -> Result<Url, ProviderError> {
        let mut url = self.endpoint.clone();
        let path = format!("{}/chat/completions", url.path().trim_end_matches('/'));
        url.set_path(&path);
        Ok(url)
    }
}

#[async_trait]
impl TranslationClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn translate_batch(
        &self,
        serialized: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Self::system_prompt(source_language, target_language),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: serialized.to_string(),
                },
            ],
            temperature: 0.3,
        };

        let response = self
            .client
            .post(self.completions_url()?)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::Unknown(format!("Failed to parse completion response: {}", e))
        })?;

        let text = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| ProviderError::Unknown("Empty completion response".to_string()))?;

        Ok(text)
    }
}
