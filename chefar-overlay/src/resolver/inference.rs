//! Multimodal inference client
//!
//! The resolver talks to the inference service through the injected
//! [`InferenceClient`] boundary; the production implementation posts a
//! Gemini `generateContent` request carrying the prompt text plus the
//! camera snapshot as an inline base64 PNG part.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chefar_common::config::InferenceConfig;
use chefar_common::{Error, Result};
use serde_json::json;

/// Prompt-in / text-out multimodal inference boundary.
///
/// Implementations may fail or return malformed text; the resolver owns
/// all sanitation and validation of the reply.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(&self, prompt: &str, image_png: &[u8]) -> Result<String>;
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Inference(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn infer(&self, prompt: &str, image_png: &[u8]) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    {
                        "inline_data": {
                            "mime_type": "image/png",
                            "data": BASE64.encode(image_png),
                        }
                    }
                ]
            }]
        });

        tracing::debug!(
            model = %self.model,
            prompt_len = prompt.len(),
            image_bytes = image_png.len(),
            "Sending inference request"
        );

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Inference(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!("HTTP {}: {}", status, error_text)));
        }

        let reply: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(e.to_string()))?;

        // candidates[0].content.parts[0].text
        reply
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::MalformedResponse("no text part in inference reply".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GeminiClient::new(&InferenceConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let config = InferenceConfig {
            base_url: "https://example.test/v1beta/".to_string(),
            ..Default::default()
        };
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://example.test/v1beta");
    }
}
