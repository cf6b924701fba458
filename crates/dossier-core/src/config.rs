use crate::fields::{FieldRegistry, FieldSpec};
use crate::model::{ModelConfig, QueryTemplate};
use crate::pricing::{ModelPrice, PriceTable};
use crate::queries;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level YAML configuration for a research run.
///
/// Only `reference_model` is mandatory; everything else has a default, and
/// map-shaped sections (`prices`, `fields`) are overrides layered on top of
/// the builtin tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    pub reference_model: ModelConfig,
    #[serde(default)]
    pub candidate_models: Vec<ModelConfig>,
    /// Judge model for LLM-graded fields. When absent those fields are
    /// graded by text similarity instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_model: Option<ModelConfig>,
    #[serde(default)]
    pub query_templates: Vec<QueryTemplate>,
    #[serde(default = "default_ttl_hours")]
    pub ground_truth_ttl_hours: f64,
    #[serde(default = "default_fuzzy_tolerance")]
    pub fuzzy_tolerance: f64,
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Per-result character cap applied when rendering evidence into the
    /// prompt. Unset means no truncation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_char_budget: Option<usize>,
    /// External price table file replacing the builtin one; `prices`
    /// entries are layered on top of whichever base is in effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prices_file: Option<PathBuf>,
    #[serde(default)]
    pub prices: BTreeMap<String, ModelPrice>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    #[serde(default)]
    pub companies: Vec<String>,
}

fn default_ttl_hours() -> f64 {
    crate::ground_truth::DEFAULT_GROUND_TRUTH_TTL_HOURS
}

fn default_fuzzy_tolerance() -> f64 {
    crate::grading::DEFAULT_FUZZY_TOLERANCE
}

fn default_parallel() -> usize {
    4
}

fn default_timeout_seconds() -> u64 {
    120
}

pub fn load_config(path: &Path) -> anyhow::Result<ResearchConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: ResearchConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

impl ResearchConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reference_model.model_id.trim().is_empty() {
            anyhow::bail!("reference_model.model_id must not be empty");
        }
        if self.ground_truth_ttl_hours <= 0.0 {
            anyhow::bail!("ground_truth_ttl_hours must be positive");
        }
        if !(0.0..1.0).contains(&self.fuzzy_tolerance) {
            anyhow::bail!("fuzzy_tolerance must be in [0, 1)");
        }
        if self.parallel == 0 {
            anyhow::bail!("parallel must be at least 1");
        }
        if self.timeout_seconds == 0 {
            anyhow::bail!("timeout_seconds must be at least 1");
        }
        for t in &self.query_templates {
            if !t.pattern.contains(queries::COMPANY_PLACEHOLDER) {
                anyhow::bail!(
                    "query template '{}' is missing the {} placeholder",
                    t.query_type,
                    queries::COMPANY_PLACEHOLDER
                );
            }
        }
        Ok(())
    }

    /// Configured templates, or the builtin set when none are given.
    pub fn effective_templates(&self) -> Vec<QueryTemplate> {
        if self.query_templates.is_empty() {
            queries::default_templates()
        } else {
            self.query_templates.clone()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn price_table(&self) -> anyhow::Result<PriceTable> {
        let base = match &self.prices_file {
            Some(path) => PriceTable::load(path)
                .with_context(|| format!("failed to load price table {}", path.display()))?,
            None => PriceTable::builtin(),
        };
        Ok(base.with_overrides(&self.prices))
    }

    pub fn field_registry(&self) -> FieldRegistry {
        FieldRegistry::company_profile().with_overrides(&self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        "reference_model:\n  provider: openai\n  model_id: gpt-4o\n"
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: ResearchConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.ground_truth_ttl_hours, 24.0);
        assert_eq!(config.parallel, 4);
        assert_eq!(config.timeout_seconds, 120);
        assert!(config.candidate_models.is_empty());
        assert_eq!(
            config.effective_templates().len(),
            queries::default_templates().len()
        );
    }

    #[test]
    fn test_overrides_are_layered() {
        let yaml = "\
reference_model:
  provider: openai
  model_id: gpt-4o
prices:
  my-model:
    prompt_per_1k: 0.5
    completion_per_1k: 1.0
fields:
  industry:
    field_type: text
    required: false
    strategy: keyword
";
        let config: ResearchConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        let table = config.price_table().unwrap();
        assert!(table.prices.contains_key("my-model"));
        assert!(table.prices.contains_key("gpt-4o-mini"));

        let registry = config.field_registry();
        assert!(!registry.is_required("industry"));
        assert!(registry.is_required("company_name"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config: ResearchConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.ground_truth_ttl_hours = 0.0;
        assert!(config.validate().is_err());

        let mut config: ResearchConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.query_templates = vec![QueryTemplate {
            query_type: "broken".into(),
            pattern: "no placeholder".into(),
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prices_file_replaces_builtin_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.yaml");
        std::fs::write(
            &path,
            "my-model:\n  prompt_per_1k: 0.002\n  completion_per_1k: 0.004\n",
        )
        .unwrap();

        let mut config: ResearchConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.prices_file = Some(path);
        config.prices.insert(
            "my-model".to_string(),
            crate::pricing::ModelPrice {
                prompt_per_1k: 1.0,
                completion_per_1k: 1.0,
            },
        );

        let table = config.price_table().unwrap();
        // The file is the base, so builtin entries are gone.
        assert!(!table.prices.contains_key("gpt-4o"));
        // Inline entries still win over the file.
        assert_eq!(table.prices["my-model"].prompt_per_1k, 1.0);

        config.prices_file = Some(dir.path().join("missing.yaml"));
        assert!(config.price_table().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("research.yaml");
        std::fs::write(&path, minimal_yaml()).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.reference_model.model_id, "gpt-4o");
    }
}
