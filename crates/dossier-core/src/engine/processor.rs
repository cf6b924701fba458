use crate::fields::FieldRegistry;
use crate::fingerprint::evidence_fingerprint;
use crate::model::{ModelConfig, ProcessingRun, PromptVersion, SearchResult, TokenUsage};
use crate::parse::parse_output;
use crate::pricing::PriceTable;
use crate::prompt;
use crate::providers::llm::LlmClient;
use crate::storage::store::now_rfc3339;
use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;

/// Phase 2: turns accumulated search evidence into a structured profile via
/// one LLM call, recording every attempt as a ProcessingRun.
///
/// Resilient by contract: provider errors and timeouts become persisted
/// failed runs, and unparseable output becomes a run with `parse_failed`
/// set and the raw text kept verbatim. The only errors this raises are
/// storage errors.
pub struct Processor {
    pub store: Store,
    pub client: Arc<dyn LlmClient>,
    pub prices: PriceTable,
    pub registry: FieldRegistry,
    pub result_char_budget: Option<usize>,
    pub timeout: Duration,
}

impl Processor {
    pub async fn process(
        &self,
        company: &str,
        prompt_version: &PromptVersion,
        model: &ModelConfig,
        evidence: &[SearchResult],
    ) -> anyhow::Result<ProcessingRun> {
        let rendered = prompt::build(
            prompt_version,
            evidence,
            company,
            self.result_char_budget,
        );
        let schema = self.registry.to_schema();
        let search_result_ids: Vec<i64> = evidence.iter().map(|r| r.id).collect();
        let fingerprint =
            evidence_fingerprint(&prompt_version.content_hash, &search_result_ids, company);

        let start = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            self.timeout,
            self.client.complete(&rendered, &schema, model),
        )
        .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut run = ProcessingRun {
            id: 0,
            company: company.to_string(),
            prompt_version_id: prompt_version.id,
            provider: model.provider.clone(),
            model_id: model.model_id.clone(),
            temperature: model.temperature,
            search_result_ids,
            evidence_fingerprint: fingerprint,
            prompt: rendered,
            structured: None,
            raw_output: String::new(),
            parse_failed: false,
            usage: TokenUsage::default(),
            estimated_cost_usd: 0.0,
            duration_ms,
            success: false,
            error: None,
            created_at: now_rfc3339(),
        };

        match outcome {
            Ok(Ok(completion)) => {
                let structured = completion
                    .structured
                    .or_else(|| parse_output(&completion.raw_text).fields().cloned());
                run.parse_failed = structured.is_none();
                run.structured = structured;
                run.raw_output = completion.raw_text;
                run.usage = completion.usage;
                run.estimated_cost_usd = self.prices.estimate(&model.model_id, completion.usage);
                run.success = true;
                if run.parse_failed {
                    tracing::warn!(
                        company,
                        model = %model.model_id,
                        "no JSON object recoverable from model output, keeping raw text"
                    );
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(company, model = %model.model_id, error = %e, "llm call failed");
                run.error = Some(e.to_string());
            }
            Err(_) => {
                tracing::warn!(company, model = %model.model_id, "llm call timed out");
                run.error = Some(format!(
                    "llm call timed out after {}s",
                    self.timeout.as_secs()
                ));
            }
        }

        let id = self.store.insert_processing_run(&run)?;
        run.id = id;
        Ok(run)
    }
}
