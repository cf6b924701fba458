use crate::model::SearchResponse;
use async_trait::async_trait;

/// External web search collaborator. May fail on network/auth errors; the
/// search executor catches those and records them as failed SearchResults.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query_text: &str) -> anyhow::Result<SearchResponse>;
    fn provider_name(&self) -> &'static str;
}

pub mod fake;
pub mod serper;
