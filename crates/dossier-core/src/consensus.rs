use crate::fields::FieldRegistry;
use crate::grading::{normalize, value_is_empty, value_text};
use crate::model::FieldMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Agreement report for one field across candidate models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConsensus {
    pub field: String,
    /// Every reporting model produced the same normalized value.
    pub unanimous: bool,
    /// The normalized value backed by a strict majority of reporting
    /// models, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub majority_value: Option<String>,
    pub agreeing_models: Vec<String>,
    pub dissenting_models: Vec<String>,
}

/// Compares extracted field values across models by normalized-text
/// equality. Models that did not report a value for a field do not vote on
/// it. Pure function of the per-model field maps.
pub fn detect(
    outputs: &BTreeMap<String, FieldMap>,
    registry: &FieldRegistry,
) -> Vec<FieldConsensus> {
    let mut report = Vec::new();

    for field in registry.fields.keys() {
        // normalized value -> models that reported it
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut voters = 0usize;

        for (model, fields) in outputs {
            let value = fields.get(field);
            if value_is_empty(value) {
                continue;
            }
            voters += 1;
            groups
                .entry(normalize(&value_text(value.unwrap())))
                .or_default()
                .push(model.clone());
        }

        if voters == 0 {
            continue;
        }

        let (top_value, top_models) = groups
            .iter()
            .max_by_key(|(_, models)| models.len())
            .map(|(v, m)| (v.clone(), m.clone()))
            .unwrap();

        let unanimous = top_models.len() == voters && groups.len() == 1;
        let majority = top_models.len() * 2 > voters;

        let agreeing = if majority { top_models.clone() } else { Vec::new() };
        let dissenting: Vec<String> = outputs
            .keys()
            .filter(|m| !value_is_empty(outputs[*m].get(field)) && !agreeing.contains(m))
            .cloned()
            .collect();

        report.push(FieldConsensus {
            field: field.clone(),
            unanimous,
            majority_value: if majority { Some(top_value) } else { None },
            agreeing_models: agreeing,
            dissenting_models: dissenting,
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outputs(values: &[(&str, &str)]) -> BTreeMap<String, FieldMap> {
        let mut out = BTreeMap::new();
        for (model, industry) in values {
            let mut fields = FieldMap::new();
            if !industry.is_empty() {
                fields.insert("industry".into(), json!(industry));
            }
            out.insert(model.to_string(), fields);
        }
        out
    }

    fn registry() -> FieldRegistry {
        FieldRegistry::company_profile()
    }

    fn find<'a>(report: &'a [FieldConsensus], field: &str) -> &'a FieldConsensus {
        report.iter().find(|c| c.field == field).unwrap()
    }

    #[test]
    fn test_unanimous_agreement() {
        let report = detect(
            &outputs(&[("a", "Video Streaming"), ("b", "video  streaming")]),
            &registry(),
        );
        let c = find(&report, "industry");
        assert!(c.unanimous);
        assert_eq!(c.majority_value.as_deref(), Some("video streaming"));
        assert!(c.dissenting_models.is_empty());
    }

    #[test]
    fn test_majority_with_dissent() {
        let report = detect(
            &outputs(&[("a", "SaaS"), ("b", "SaaS"), ("c", "Fintech")]),
            &registry(),
        );
        let c = find(&report, "industry");
        assert!(!c.unanimous);
        assert_eq!(c.majority_value.as_deref(), Some("saas"));
        assert_eq!(c.agreeing_models, vec!["a", "b"]);
        assert_eq!(c.dissenting_models, vec!["c"]);
    }

    #[test]
    fn test_split_has_no_majority() {
        let report = detect(&outputs(&[("a", "SaaS"), ("b", "Fintech")]), &registry());
        let c = find(&report, "industry");
        assert!(c.majority_value.is_none());
        assert_eq!(c.dissenting_models.len(), 2);
    }

    #[test]
    fn test_missing_values_do_not_vote() {
        let report = detect(&outputs(&[("a", "SaaS"), ("b", "")]), &registry());
        let c = find(&report, "industry");
        assert!(c.unanimous, "a single reporting model is unanimous");
        assert_eq!(c.agreeing_models, vec!["a"]);
    }
}
