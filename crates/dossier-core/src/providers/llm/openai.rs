use super::LlmClient;
use crate::model::{LlmCompletion, ModelConfig, TokenUsage};
use crate::parse::{parse_output, ParsedOutput};
use async_trait::async_trait;
use serde_json::json;

pub struct OpenAiClient {
    pub api_key: String,
    pub client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
        model: &ModelConfig,
    ) -> anyhow::Result<LlmCompletion> {
        let url = "https://api.openai.com/v1/chat/completions";

        let system = format!(
            "You extract structured company data. Respond with a single JSON object matching this schema:\n{}",
            schema
        );

        let body = json!({
            "model": model.model_id,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "temperature": model.temperature,
            "max_tokens": model.max_tokens,
            "response_format": { "type": "json_object" },
        });

        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI chat API error: {}", error_text);
        }

        let payload: serde_json::Value = resp.json().await?;

        let text = payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("OpenAI API response missing content"))?
            .to_string();

        let usage = TokenUsage {
            prompt_tokens: payload
                .pointer("/usage/prompt_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            completion_tokens: payload
                .pointer("/usage/completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
        };

        let structured = match parse_output(&text) {
            ParsedOutput::Structured(map) => Some(map),
            ParsedOutput::Unstructured(_) => None,
        };

        Ok(LlmCompletion {
            structured,
            raw_text: text,
            usage,
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
