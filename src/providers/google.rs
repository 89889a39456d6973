use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;
use crate::providers::TranslationClient;

/// Fallback client for the public Google translate endpoint.
///
/// Used without an API key, one request per batch. Google does not know about
/// our separator token, but it passes short ASCII tokens through untouched,
/// so the delimiter protocol survives the round trip.
#[derive(Debug)]
pub struct GoogleClient {
    /// HTTP client with the per-request timeout baked in
    client: Client,
    /// Base endpoint URL
    endpoint: Url,
}

impl GoogleClient {
    /// Create a client from provider configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| ProviderError::Unknown(format!("Invalid endpoint: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ProviderError::from)?;

        Ok(Self { client, endpoint })
    }

    /// Concatenate the translated chunks out of the nested array reply
    fn extract_translation(value: &Value) -> Result<String, ProviderError> {
        let chunks = value
            .get(0)
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::Unknown("Unexpected translate reply shape".to_string()))?;

        let mut out = String::new();
        for chunk in chunks {
            if let Some(text) = chunk.get(0).and_then(Value::as_str) {
                out.push_str(text);
            }
        }

        if out.trim().is_empty() {
            return Err(ProviderError::Unknown("Empty translate reply".to_string()));
        }
        Ok(out)
    }
}

#[async_trait]
impl TranslationClient for GoogleClient {
    fn name(&self) -> &str {
        "google"
    }

    async fn translate_batch(
        &self,
        serialized: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, ProviderError> {
        let mut url = self.endpoint.clone();
        url.set_path("/translate_a/single");

        let response = self
            .client
            .get(url)
            .query(&[
                ("client", "gtx"),
                ("dt", "t"),
                ("sl", source_language),
                ("tl", target_language),
                ("q", serialized),
            ])
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let value: Value = response.json().await.map_err(|e| {
            ProviderError::Unknown(format!("Failed to parse translate reply: {}", e))
        })?;

        Self::extract_translation(&value)
    }
}
