use crate::fields::FieldRegistry;
use crate::model::{AggregateScores, FieldScore};
use std::collections::BTreeMap;

/// Rolls per-field scores into overall / required / optional / weighted
/// metrics. Pure function of the score map and the registry's field
/// classification: excluded scores are skipped everywhere, and the weighted
/// mean counts each critical field twice, a scheme simple enough to check
/// by hand.
pub fn aggregate(
    field_scores: &BTreeMap<String, FieldScore>,
    registry: &FieldRegistry,
) -> AggregateScores {
    let mut all = Vec::new();
    let mut required = Vec::new();
    let mut optional = Vec::new();
    let mut weighted = Vec::new();

    for (name, fs) in field_scores {
        if fs.excluded {
            continue;
        }
        all.push(fs.score);
        if registry.is_required(name) {
            required.push(fs.score);
        } else {
            optional.push(fs.score);
        }
        weighted.push(fs.score);
        if registry.is_critical(name) {
            weighted.push(fs.score);
        }
    }

    AggregateScores {
        overall: mean(&all),
        required: mean(&required),
        optional: mean(&optional),
        weighted: mean(&weighted),
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldSpec, FieldType};
    use crate::model::{MatchKind, MatchStrategy};

    fn registry() -> FieldRegistry {
        let mut fields = BTreeMap::new();
        for (name, required, critical) in [
            ("industry", true, false),
            ("company_size", true, false),
            ("headquarters", true, false),
            ("description", false, false),
        ] {
            fields.insert(
                name.to_string(),
                FieldSpec {
                    field_type: FieldType::Text,
                    required,
                    critical,
                    strategy: MatchStrategy::Exact,
                    hint: None,
                },
            );
        }
        FieldRegistry::new(fields)
    }

    fn score(field: &str, value: f64) -> FieldScore {
        FieldScore {
            field: field.to_string(),
            score: value,
            match_kind: MatchKind::Partial,
            explanation: String::new(),
            confidence: 1.0,
            excluded: false,
        }
    }

    #[test]
    fn test_overall_and_required_means() {
        let mut scores = BTreeMap::new();
        scores.insert("industry".into(), score("industry", 85.0));
        scores.insert("company_size".into(), score("company_size", 100.0));
        scores.insert("headquarters".into(), score("headquarters", 90.0));
        scores.insert("description".into(), score("description", 75.0));

        let agg = aggregate(&scores, &registry());
        assert!((agg.overall.unwrap() - 87.5).abs() < 1e-9);
        assert!((agg.required.unwrap() - 275.0 / 3.0).abs() < 1e-9); // 91.67
        assert!((agg.optional.unwrap() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_counts_critical_twice() {
        let mut reg = registry();
        reg.fields.get_mut("company_size").unwrap().critical = true;

        let mut scores = BTreeMap::new();
        scores.insert("industry".into(), score("industry", 85.0));
        scores.insert("company_size".into(), score("company_size", 100.0));
        scores.insert("headquarters".into(), score("headquarters", 90.0));
        scores.insert("description".into(), score("description", 75.0));

        let agg = aggregate(&scores, &reg);
        // (85 + 100 + 100 + 90 + 75) / 5
        assert!((agg.weighted.unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_excluded_scores_are_skipped() {
        let mut scores = BTreeMap::new();
        scores.insert("industry".into(), score("industry", 80.0));
        let mut missing = score("description", 0.0);
        missing.excluded = true;
        scores.insert("description".into(), missing);

        let agg = aggregate(&scores, &registry());
        assert!((agg.overall.unwrap() - 80.0).abs() < 1e-9);
        assert!(agg.optional.is_none(), "only optional field was excluded");
    }

    #[test]
    fn test_empty_map_aggregates_to_none() {
        let agg = aggregate(&BTreeMap::new(), &registry());
        assert!(agg.overall.is_none());
        assert!(agg.required.is_none());
        assert!(agg.weighted.is_none());
    }
}
