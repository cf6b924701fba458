use crate::clock::{is_fresh, CacheEntry, Clock};
use crate::model::{ModelConfig, OutputValidation, PromptVersion};
use crate::storage::Store;
use async_trait::async_trait;
use std::sync::Arc;

/// The full Phase 1 + Phase 2 pipeline for one (company, prompt version,
/// model), persisting and returning the structured output. Implemented by
/// the engine runner; abstracted so the caching layer is testable with a
/// counting fake.
#[async_trait]
pub trait ProfilePipeline: Send + Sync {
    async fn extract(
        &self,
        company: &str,
        prompt_version: &PromptVersion,
        model: &ModelConfig,
        test_run_id: i64,
        ground_truth: bool,
    ) -> anyhow::Result<OutputValidation>;
}

/// Time-boxed cache around the reference-model pipeline, so repeated test
/// runs do not re-spend reference-model budget. A returned ground truth is
/// never older than the TTL unless a refresh is forced; superseded rows are
/// kept as the audit trail.
pub struct GroundTruthManager {
    pub store: Store,
    pub pipeline: Arc<dyn ProfilePipeline>,
    pub clock: Arc<dyn Clock>,
    pub reference_model: ModelConfig,
    pub default_ttl_hours: f64,
}

pub const DEFAULT_GROUND_TRUTH_TTL_HOURS: f64 = 24.0;

impl GroundTruthManager {
    /// Returns a fresh ground-truth output for (company, prompt version).
    ///
    /// Precedence for the TTL: the explicit `ttl_hours` argument, then the
    /// manager's configured default.
    pub async fn ensure(
        &self,
        company: &str,
        prompt_version: &PromptVersion,
        test_run_id: i64,
        ttl_hours: Option<f64>,
        force_refresh: bool,
    ) -> anyhow::Result<OutputValidation> {
        let ttl = ttl_hours.unwrap_or(self.default_ttl_hours);

        if !force_refresh {
            if let Some(existing) = self
                .store
                .latest_ground_truth(company, prompt_version.id)?
            {
                let created_at = chrono::DateTime::parse_from_rfc3339(&existing.created_at)
                    .map(|t| t.with_timezone(&chrono::Utc));
                if let Ok(created_at) = created_at {
                    let entry = CacheEntry {
                        value: (),
                        created_at,
                    };
                    if is_fresh(&entry, ttl, self.clock.now()) {
                        tracing::debug!(company, "ground truth cache hit");
                        return Ok(existing);
                    }
                }
            }
        }

        tracing::info!(
            company,
            model = %self.reference_model.model_id,
            "running reference pipeline for ground truth"
        );
        self.pipeline
            .extract(
                company,
                prompt_version,
                &self.reference_model,
                test_run_id,
                true,
            )
            .await
    }
}
