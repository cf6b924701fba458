use super::SearchProvider;
use crate::model::{SearchHit, SearchResponse};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory search provider for tests and offline runs. Returns one canned
/// hit per query and can be told to fail for queries containing a marker
/// substring.
#[derive(Default)]
pub struct FakeSearchProvider {
    pub calls: AtomicUsize,
    fail_markers: Mutex<HashSet<String>>,
}

impl FakeSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any query whose text contains `marker` will error.
    pub fn fail_queries_containing(&self, marker: &str) {
        self.fail_markers.lock().unwrap().insert(marker.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for FakeSearchProvider {
    async fn search(&self, query_text: &str) -> anyhow::Result<SearchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let markers = self.fail_markers.lock().unwrap().clone();
        if markers.iter().any(|m| query_text.contains(m)) {
            anyhow::bail!("simulated search outage for query: {}", query_text);
        }

        let snippet = format!("Results for: {}", query_text);
        Ok(SearchResponse {
            provider: "fake".to_string(),
            raw: serde_json::json!({
                "query": query_text,
                "organic": [{ "title": "Fake result", "snippet": snippet.clone() }],
            }),
            hits: vec![SearchHit {
                title: "Fake result".to_string(),
                url: "https://example.com".to_string(),
                snippet,
            }],
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
