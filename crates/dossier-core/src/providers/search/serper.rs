use super::SearchProvider;
use crate::model::{SearchHit, SearchResponse};
use async_trait::async_trait;
use serde_json::json;

/// Google-search provider backed by serper.dev.
pub struct SerperClient {
    pub api_key: String,
    pub client: reqwest::Client,
}

impl SerperClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SearchProvider for SerperClient {
    async fn search(&self, query_text: &str) -> anyhow::Result<SearchResponse> {
        let url = "https://google.serper.dev/search";

        let resp = self
            .client
            .post(url)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&json!({ "q": query_text }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("serper API error ({}): {}", status, error_text);
        }

        let raw: serde_json::Value = resp.json().await?;

        // Flatten the organic results; the raw payload is kept verbatim so
        // nothing is lost if the response shape changes.
        let hits = raw
            .get("organic")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .map(|item| SearchHit {
                        title: str_at(item, "title"),
                        url: str_at(item, "link"),
                        snippet: str_at(item, "snippet"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(SearchResponse {
            provider: "serper".to_string(),
            raw,
            hits,
        })
    }

    fn provider_name(&self) -> &'static str {
        "serper"
    }
}

fn str_at(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|s| s.as_str())
        .unwrap_or_default()
        .to_string()
}
