use crate::model::{LlmCompletion, ModelConfig};
use async_trait::async_trait;

/// External LLM collaborator. `schema` is the expected-output contract
/// rendered from the field registry; providers that cannot guarantee
/// schema-constrained output return `structured: None` and the caller falls
/// back to best-effort parsing of `raw_text`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
        model: &ModelConfig,
    ) -> anyhow::Result<LlmCompletion>;
    fn provider_name(&self) -> &'static str;
}

pub mod fake;
pub mod openai;
