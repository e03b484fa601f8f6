use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::{
    config::Config,
    constants::{PROVIDER_CONNECT_TIMEOUT_SECS, PROVIDER_REQUEST_TIMEOUT_SECS},
    error::{AppError, Result},
    integrations::AssistantProvider,
};

const SYSTEM_PROMPT: &str = "You are OnchainBudget GPT, an AI financial assistant that helps users \
manage and understand their finances across onchain (crypto) and offchain (traditional banking) \
platforms. Be smart, casual and slightly witty; warm and conversational with a touch of humor; \
concise but informative; use emojis sparingly. You can analyze wallet balances and bank \
transactions, categorize spending, provide budgeting advice, and explain crypto concepts in \
simple terms. Always prioritize user financial security and privacy.";

#[derive(Clone)]
pub struct GeminiClient {
    api_url: String,
    api_key: Option<String>,
    model: String,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(PROVIDER_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(PROVIDER_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Gemini HTTP client init failed: {}", e)))?;

        Ok(Self {
            api_url: config.gemini_api_url.trim_end_matches('/').to_string(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            http,
        })
    }

    fn endpoint(&self) -> Result<Url> {
        let key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AppError::Internal("Gemini API key is not configured".to_string()))?;

        let mut url = Url::parse(&format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_url, self.model
        ))
        .map_err(|e| AppError::Internal(format!("Invalid Gemini URL: {}", e)))?;
        url.query_pairs_mut().append_pair("key", key);
        Ok(url)
    }
}

// Pulls the first candidate's text out of a generateContent response.
fn extract_reply(body: &Value) -> Result<String> {
    let text = body
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            AppError::ProviderData("Gemini response carried no candidate text".to_string())
        })?;

    if text.trim().is_empty() {
        return Err(AppError::ProviderData(
            "Gemini response text was empty".to_string(),
        ));
    }
    Ok(text.to_string())
}

#[async_trait]
impl AssistantProvider for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = self.endpoint()?;

        let request = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream { status, body });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::ProviderData(format!("Gemini payload decode failed: {}", e)))?;

        extract_reply(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_candidate_text() {
        let body = serde_json::json!({
            "candidates": [
                { "content": { "parts": [{ "text": "Here is your spending breakdown." }] } }
            ]
        });
        assert_eq!(
            extract_reply(&body).unwrap(),
            "Here is your spending breakdown."
        );
    }

    #[test]
    fn empty_or_missing_candidates_are_provider_data_errors() {
        assert!(matches!(
            extract_reply(&serde_json::json!({ "candidates": [] })),
            Err(AppError::ProviderData(_))
        ));
        assert!(matches!(
            extract_reply(&serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "   " }] } }]
            })),
            Err(AppError::ProviderData(_))
        ));
    }

    #[test]
    fn missing_api_key_fails_before_any_request() {
        let client = GeminiClient::new(&crate::config::test_config()).unwrap();
        assert!(client.endpoint().is_err());
    }
}
