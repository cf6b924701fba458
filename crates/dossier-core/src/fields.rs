use crate::model::MatchStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    List,
}

/// Declaration of one extracted field: how it is rendered into the prompt
/// schema, whether it is required/critical, and which matching strategy
/// grades it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub critical: bool,
    pub strategy: MatchStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Single source of truth for the extracted-profile shape. Consulted by the
/// prompt builder (schema hints), the grader (strategy selection) and the
/// aggregator (required/critical classification).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRegistry {
    pub fields: BTreeMap<String, FieldSpec>,
}

impl FieldRegistry {
    pub fn new(fields: BTreeMap<String, FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn spec(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.get(field)
    }

    pub fn is_required(&self, field: &str) -> bool {
        self.spec(field).map(|s| s.required).unwrap_or(false)
    }

    pub fn is_critical(&self, field: &str) -> bool {
        self.spec(field).map(|s| s.critical).unwrap_or(false)
    }

    /// Applies per-field overrides from configuration on top of this registry.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, FieldSpec>) -> Self {
        for (name, spec) in overrides {
            self.fields.insert(name.clone(), spec.clone());
        }
        self
    }

    /// Renders the schema-hints block embedded in a prompt version's content.
    /// Field order is the registry's (sorted) order, so the rendering is
    /// deterministic for a given registry.
    pub fn schema_hints(&self) -> String {
        let mut out = String::from("Return a JSON object with exactly these fields:\n");
        for (name, spec) in &self.fields {
            let ty = match spec.field_type {
                FieldType::Text => "string",
                FieldType::Number => "number or numeric range as text",
                FieldType::List => "array of strings",
            };
            let req = if spec.required { "required" } else { "optional" };
            match &spec.hint {
                Some(h) => out.push_str(&format!("- {} ({}, {}): {}\n", name, ty, req, h)),
                None => out.push_str(&format!("- {} ({}, {})\n", name, ty, req)),
            }
        }
        out
    }

    /// JSON schema handed to the LLM collaborator. Treated as an opaque
    /// contract by everything else in this crate.
    pub fn to_schema(&self) -> serde_json::Value {
        let mut props = serde_json::Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.fields {
            let ty = match spec.field_type {
                FieldType::Text | FieldType::Number => serde_json::json!({ "type": "string" }),
                FieldType::List => {
                    serde_json::json!({ "type": "array", "items": { "type": "string" } })
                }
            };
            props.insert(name.clone(), ty);
            if spec.required {
                required.push(serde_json::Value::String(name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required,
        })
    }

    /// Default company-profile registry.
    pub fn company_profile() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            "company_name".to_string(),
            FieldSpec {
                field_type: FieldType::Text,
                required: true,
                critical: false,
                strategy: MatchStrategy::Exact,
                hint: Some("official company name".into()),
            },
        );
        fields.insert(
            "website".to_string(),
            FieldSpec {
                field_type: FieldType::Text,
                required: false,
                critical: false,
                strategy: MatchStrategy::Exact,
                hint: Some("primary website URL".into()),
            },
        );
        fields.insert(
            "industry".to_string(),
            FieldSpec {
                field_type: FieldType::Text,
                required: true,
                critical: true,
                strategy: MatchStrategy::Judge,
                hint: Some("primary industry or sector".into()),
            },
        );
        fields.insert(
            "description".to_string(),
            FieldSpec {
                field_type: FieldType::Text,
                required: true,
                critical: false,
                strategy: MatchStrategy::Judge,
                hint: Some("one-paragraph description of what the company does".into()),
            },
        );
        fields.insert(
            "company_size".to_string(),
            FieldSpec {
                field_type: FieldType::Number,
                required: true,
                critical: true,
                strategy: MatchStrategy::Fuzzy,
                hint: Some("employee count or range, e.g. \"51-200 employees\"".into()),
            },
        );
        fields.insert(
            "headquarters".to_string(),
            FieldSpec {
                field_type: FieldType::Text,
                required: true,
                critical: false,
                strategy: MatchStrategy::Similarity,
                hint: Some("city and country of the headquarters".into()),
            },
        );
        fields.insert(
            "founded_year".to_string(),
            FieldSpec {
                field_type: FieldType::Number,
                required: false,
                critical: false,
                strategy: MatchStrategy::Fuzzy,
                hint: Some("year the company was founded".into()),
            },
        );
        fields.insert(
            "funding_total".to_string(),
            FieldSpec {
                field_type: FieldType::Number,
                required: false,
                critical: false,
                strategy: MatchStrategy::Fuzzy,
                hint: Some("total funding raised, in USD".into()),
            },
        );
        fields.insert(
            "key_products".to_string(),
            FieldSpec {
                field_type: FieldType::List,
                required: false,
                critical: false,
                strategy: MatchStrategy::Keyword,
                hint: Some("main products or services".into()),
            },
        );
        Self { fields }
    }
}
