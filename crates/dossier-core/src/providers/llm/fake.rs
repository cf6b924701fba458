use super::LlmClient;
use crate::model::{FieldMap, LlmCompletion, ModelConfig, TokenUsage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory LLM for tests. Serves canned field maps per model id, or raw
/// text when configured, and counts calls so caching behavior is observable.
#[derive(Default)]
pub struct FakeLlmClient {
    pub calls: AtomicUsize,
    outputs: Mutex<HashMap<String, FieldMap>>,
    raw_outputs: Mutex<HashMap<String, String>>,
    fail_models: Mutex<HashMap<String, String>>,
}

impl FakeLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_output(&self, model_id: &str, fields: FieldMap) {
        self.outputs
            .lock()
            .unwrap()
            .insert(model_id.to_string(), fields);
    }

    /// Raw-text-only answer (no structured output), to exercise the
    /// best-effort parse path.
    pub fn set_raw_output(&self, model_id: &str, raw: &str) {
        self.raw_outputs
            .lock()
            .unwrap()
            .insert(model_id.to_string(), raw.to_string());
    }

    pub fn fail_model(&self, model_id: &str, error: &str) {
        self.fail_models
            .lock()
            .unwrap()
            .insert(model_id.to_string(), error.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(
        &self,
        _prompt: &str,
        _schema: &serde_json::Value,
        model: &ModelConfig,
    ) -> anyhow::Result<LlmCompletion> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.fail_models.lock().unwrap().get(&model.model_id) {
            anyhow::bail!("{}", err);
        }

        let usage = TokenUsage {
            prompt_tokens: 1000,
            completion_tokens: 200,
        };

        if let Some(raw) = self.raw_outputs.lock().unwrap().get(&model.model_id) {
            return Ok(LlmCompletion {
                structured: None,
                raw_text: raw.clone(),
                usage,
            });
        }

        let fields = self
            .outputs
            .lock()
            .unwrap()
            .get(&model.model_id)
            .cloned()
            .unwrap_or_default();
        let raw_text = serde_json::to_string(&fields)?;
        Ok(LlmCompletion {
            structured: Some(fields),
            raw_text,
            usage,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
