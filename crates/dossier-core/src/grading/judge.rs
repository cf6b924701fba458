use crate::grading::value_text;
use crate::model::{FieldScore, MatchKind, ModelConfig, TokenUsage};
use crate::parse::{parse_output, ParsedOutput};
use crate::providers::llm::LlmClient;
use crate::storage::Store;
use serde_json::json;
use std::sync::Arc;

const JUDGE_TEMPLATE_VERSION: &str = "v1";

/// Auxiliary LLM grader for free-text fields where programmatic matching is
/// insufficient. Verdicts are cached in the store keyed on the full judge
/// input, so re-grading identical pairs costs nothing.
#[derive(Clone)]
pub struct FieldJudge {
    pub model: ModelConfig,
    pub store: Store,
    pub client: Arc<dyn LlmClient>,
    pub refresh: bool,
}

impl FieldJudge {
    pub fn new(model: ModelConfig, store: Store, client: Arc<dyn LlmClient>) -> Self {
        Self {
            model,
            store,
            client,
            refresh: false,
        }
    }

    pub async fn grade(
        &self,
        field: &str,
        expected: &serde_json::Value,
        actual: &serde_json::Value,
    ) -> anyhow::Result<(FieldScore, TokenUsage)> {
        let expected_text = value_text(expected);
        let actual_text = value_text(actual);

        let key = self.cache_key(field, &expected_text, &actual_text);
        if !self.refresh {
            if let Some(payload) = self.store.judge_cache_get(&key)? {
                tracing::debug!(field, "judge cache hit");
                return Ok((score_from_verdict(field, &payload), TokenUsage::default()));
            }
        }

        let prompt = format!(
            "You are grading one field of an extracted company profile against a reference value.\n\
             Field: {field}\n\
             Reference value: {expected_text}\n\
             Candidate value: {actual_text}\n\n\
             Judge whether the candidate conveys the same information as the reference.\n\
             Respond with a JSON object: {{\"score\": 0-100, \"match_type\": \
             \"exact\"|\"semantic\"|\"partial\"|\"none\", \"explanation\": \
             \"one line\", \"confidence\": 0.0-1.0}}"
        );
        let schema = json!({
            "type": "object",
            "properties": {
                "score": { "type": "number" },
                "match_type": { "type": "string" },
                "explanation": { "type": "string" },
                "confidence": { "type": "number" }
            },
            "required": ["score", "match_type"]
        });

        let completion = self.client.complete(&prompt, &schema, &self.model).await?;

        let verdict = completion
            .structured
            .map(|m| serde_json::Value::Object(m.into_iter().collect()))
            .or_else(|| match parse_output(&completion.raw_text) {
                ParsedOutput::Structured(m) => {
                    Some(serde_json::Value::Object(m.into_iter().collect()))
                }
                ParsedOutput::Unstructured(_) => None,
            });

        let score = match verdict {
            Some(payload) => {
                self.store.judge_cache_put(
                    &key,
                    &self.model.provider,
                    &self.model.model_id,
                    field,
                    &payload,
                )?;
                score_from_verdict(field, &payload)
            }
            None => FieldScore {
                field: field.to_string(),
                score: 0.0,
                match_kind: MatchKind::None,
                explanation: "judge returned an unparseable verdict".to_string(),
                confidence: 0.0,
                excluded: false,
            },
        };

        Ok((score, completion.usage))
    }

    fn cache_key(&self, field: &str, expected: &str, actual: &str) -> String {
        // Length-prefixed framing: values may themselves contain any
        // delimiter, so plain joining could alias distinct inputs.
        let mut raw = String::new();
        for part in [
            self.model.provider.as_str(),
            self.model.model_id.as_str(),
            JUDGE_TEMPLATE_VERSION,
            field,
            expected,
            actual,
        ] {
            raw.push_str(&format!("{}:{};", part.len(), part));
        }
        format!("{:x}", md5::compute(raw))
    }
}

fn score_from_verdict(field: &str, payload: &serde_json::Value) -> FieldScore {
    let score = payload
        .get("score")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, 100.0);
    let match_kind = payload
        .get("match_type")
        .and_then(|v| v.as_str())
        .map(MatchKind::parse)
        .unwrap_or(MatchKind::None);
    let explanation = payload
        .get("explanation")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let confidence = payload
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    FieldScore {
        field: field.to_string(),
        score,
        match_kind,
        explanation,
        confidence,
        excluded: false,
    }
}
