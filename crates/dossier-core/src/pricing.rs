use crate::model::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPrice {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

/// Per-model-id price table consulted by the LLM processor to estimate the
/// dollar cost of a run. External configuration; the builtin table only
/// seeds common defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceTable {
    pub prices: BTreeMap<String, ModelPrice>,
}

impl PriceTable {
    pub fn builtin() -> Self {
        let mut prices = BTreeMap::new();
        prices.insert(
            "gpt-4o".to_string(),
            ModelPrice {
                prompt_per_1k: 0.0025,
                completion_per_1k: 0.01,
            },
        );
        prices.insert(
            "gpt-4o-mini".to_string(),
            ModelPrice {
                prompt_per_1k: 0.00015,
                completion_per_1k: 0.0006,
            },
        );
        prices.insert(
            "claude-sonnet-4-20250514".to_string(),
            ModelPrice {
                prompt_per_1k: 0.003,
                completion_per_1k: 0.015,
            },
        );
        Self { prices }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let prices: BTreeMap<String, ModelPrice> = serde_yaml::from_str(&raw)?;
        Ok(Self { prices })
    }

    /// Layers `overrides` on top of this table.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, ModelPrice>) -> Self {
        for (model, price) in overrides {
            self.prices.insert(model.clone(), *price);
        }
        self
    }

    /// Estimated USD cost for one completion. Unknown models cost 0 and are
    /// logged, rather than failing the run.
    pub fn estimate(&self, model_id: &str, usage: TokenUsage) -> f64 {
        match self.prices.get(model_id) {
            Some(p) => {
                (usage.prompt_tokens as f64 / 1000.0) * p.prompt_per_1k
                    + (usage.completion_tokens as f64 / 1000.0) * p.completion_per_1k
            }
            None => {
                tracing::warn!(model_id, "no price entry for model, estimating cost as 0");
                0.0
            }
        }
    }
}
