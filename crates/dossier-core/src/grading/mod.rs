use crate::fields::FieldRegistry;
use crate::model::{FieldMap, FieldScore, MatchKind, MatchStrategy, TokenUsage};
use std::collections::BTreeMap;

pub mod fuzzy;
pub mod judge;

/// Symmetric expansion applied to the expected numeric range before overlap
/// is computed.
pub const DEFAULT_FUZZY_TOLERANCE: f64 = 0.3;

/// Bigram-Jaccard similarity above this grades as a semantic match.
pub const SIMILARITY_SEMANTIC_THRESHOLD: f64 = 0.8;
/// Bigram-Jaccard similarity above this grades as a partial match.
pub const SIMILARITY_PARTIAL_THRESHOLD: f64 = 0.4;

/// Case/whitespace-insensitive canonical form used by every strategy.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Best-effort text coercion. Lists join with ", "; objects fall back to
/// their JSON rendering. Unconvertible values never raise.
pub fn value_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => arr
            .iter()
            .map(value_text)
            .collect::<Vec<_>>()
            .join(", "),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn value_is_empty(v: Option<&serde_json::Value>) -> bool {
    match v {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::String(s)) => s.trim().is_empty(),
        Some(serde_json::Value::Array(arr)) => arr.is_empty(),
        Some(_) => false,
    }
}

/// Empty-value policy shared by every strategy. Returns Some when the pair
/// is decided without consulting the strategy at all.
///
/// - both empty: nothing to verify, score 100 (optional fields are also
///   dropped from aggregation);
/// - expected present, actual empty: 0 for required fields, excluded for
///   optional ones so absent optional data is not penalized;
/// - expected empty, actual present: unverifiable without a baseline,
///   recorded as 100 with zero confidence and excluded.
pub fn edge_policy(
    field: &str,
    expected: Option<&serde_json::Value>,
    actual: Option<&serde_json::Value>,
    required: bool,
) -> Option<FieldScore> {
    let expected_empty = value_is_empty(expected);
    let actual_empty = value_is_empty(actual);

    match (expected_empty, actual_empty) {
        (true, true) => Some(FieldScore {
            field: field.to_string(),
            score: 100.0,
            match_kind: MatchKind::Exact,
            explanation: "both values empty; nothing to verify".to_string(),
            confidence: 1.0,
            excluded: !required,
        }),
        (false, true) => Some(FieldScore {
            field: field.to_string(),
            score: 0.0,
            match_kind: MatchKind::None,
            explanation: "expected a value but none was extracted".to_string(),
            confidence: 1.0,
            excluded: !required,
        }),
        (true, false) => Some(FieldScore {
            field: field.to_string(),
            score: 100.0,
            match_kind: MatchKind::Semantic,
            explanation: "no baseline value to verify against".to_string(),
            confidence: 0.0,
            excluded: true,
        }),
        (false, false) => None,
    }
}

/// Grades one field of a candidate output against the reference value using
/// the given programmatic strategy. The Judge strategy is handled by
/// [`Grader`]; calling it here falls back to bigram similarity.
pub fn grade_field(
    field: &str,
    expected: Option<&serde_json::Value>,
    actual: Option<&serde_json::Value>,
    strategy: MatchStrategy,
    required: bool,
    tolerance: f64,
) -> FieldScore {
    if let Some(score) = edge_policy(field, expected, actual, required) {
        return score;
    }
    // edge_policy returned None, so both values are present.
    let expected = expected.unwrap();
    let actual = actual.unwrap();

    match strategy {
        MatchStrategy::Exact => exact_match(field, expected, actual),
        MatchStrategy::Keyword => keyword_match(field, expected, actual),
        MatchStrategy::Fuzzy => {
            fuzzy::grade(field, &value_text(expected), &value_text(actual), tolerance)
        }
        MatchStrategy::Similarity | MatchStrategy::Judge => {
            similarity_match(field, expected, actual)
        }
    }
}

fn exact_match(
    field: &str,
    expected: &serde_json::Value,
    actual: &serde_json::Value,
) -> FieldScore {
    let matched = normalize(&value_text(expected)) == normalize(&value_text(actual));
    FieldScore {
        field: field.to_string(),
        score: if matched { 100.0 } else { 0.0 },
        match_kind: if matched {
            MatchKind::Exact
        } else {
            MatchKind::None
        },
        explanation: if matched {
            "values match after normalization".to_string()
        } else {
            "values differ".to_string()
        },
        confidence: 1.0,
        excluded: false,
    }
}

/// Keywords come from the expected value: array elements, or a string split
/// on commas (falling back to whitespace).
fn expected_keywords(expected: &serde_json::Value) -> Vec<String> {
    match expected {
        serde_json::Value::Array(arr) => arr
            .iter()
            .map(|v| normalize(&value_text(v)))
            .filter(|s| !s.is_empty())
            .collect(),
        other => {
            let text = value_text(other);
            let parts: Vec<String> = if text.contains(',') {
                text.split(',').map(normalize).collect()
            } else {
                text.split_whitespace().map(normalize).collect()
            };
            parts.into_iter().filter(|s| !s.is_empty()).collect()
        }
    }
}

fn keyword_match(
    field: &str,
    expected: &serde_json::Value,
    actual: &serde_json::Value,
) -> FieldScore {
    let keywords = expected_keywords(expected);
    if keywords.is_empty() {
        return FieldScore {
            field: field.to_string(),
            score: 0.0,
            match_kind: MatchKind::None,
            explanation: "no keywords could be derived from expected value".to_string(),
            confidence: 0.0,
            excluded: false,
        };
    }

    let haystack = normalize(&value_text(actual));
    let found = keywords.iter().filter(|k| haystack.contains(*k)).count();
    let ratio = found as f64 / keywords.len() as f64;
    let score = ratio * 100.0;

    let match_kind = if found == keywords.len() {
        MatchKind::Exact
    } else if found > 0 {
        MatchKind::Partial
    } else {
        MatchKind::None
    };

    FieldScore {
        field: field.to_string(),
        score,
        match_kind,
        explanation: format!("{}/{} required keywords present", found, keywords.len()),
        confidence: ratio,
        excluded: false,
    }
}

fn bigrams(s: &str) -> std::collections::HashSet<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

fn similarity_match(
    field: &str,
    expected: &serde_json::Value,
    actual: &serde_json::Value,
) -> FieldScore {
    let e = normalize(&value_text(expected));
    let a = normalize(&value_text(actual));

    let sim = if e == a {
        1.0
    } else {
        let eb = bigrams(&e);
        let ab = bigrams(&a);
        if eb.is_empty() || ab.is_empty() {
            0.0
        } else {
            let intersection = eb.intersection(&ab).count() as f64;
            let union = eb.union(&ab).count() as f64;
            intersection / union
        }
    };

    let match_kind = if sim >= 1.0 {
        MatchKind::Exact
    } else if sim >= SIMILARITY_SEMANTIC_THRESHOLD {
        MatchKind::Semantic
    } else if sim >= SIMILARITY_PARTIAL_THRESHOLD {
        MatchKind::Partial
    } else {
        MatchKind::None
    };

    FieldScore {
        field: field.to_string(),
        score: sim * 100.0,
        match_kind,
        explanation: format!("bigram similarity {:.2}", sim),
        confidence: sim,
        excluded: false,
    }
}

/// Grades a whole candidate output against the reference output, selecting
/// the strategy per field from the registry. LLM-graded fields go through
/// the judge service when one is configured, and fall back to bigram
/// similarity otherwise. Never raises: judge failures score 0 with the
/// error recorded in the explanation.
pub struct Grader {
    pub registry: FieldRegistry,
    pub tolerance: f64,
    pub judge: Option<judge::FieldJudge>,
}

impl Grader {
    pub fn new(registry: FieldRegistry) -> Self {
        Self {
            registry,
            tolerance: DEFAULT_FUZZY_TOLERANCE,
            judge: None,
        }
    }

    pub fn with_judge(mut self, judge: judge::FieldJudge) -> Self {
        self.judge = Some(judge);
        self
    }

    pub async fn grade_output(
        &self,
        expected: &FieldMap,
        actual: &FieldMap,
    ) -> (BTreeMap<String, FieldScore>, TokenUsage) {
        let mut scores = BTreeMap::new();
        let mut judge_usage = TokenUsage::default();

        for (name, spec) in &self.registry.fields {
            let exp = expected.get(name);
            let act = actual.get(name);

            if let Some(score) = edge_policy(name, exp, act, spec.required) {
                scores.insert(name.clone(), score);
                continue;
            }

            let score = if spec.strategy == MatchStrategy::Judge {
                match &self.judge {
                    Some(j) => match j.grade(name, exp.unwrap(), act.unwrap()).await {
                        Ok((score, usage)) => {
                            judge_usage.add(usage);
                            score
                        }
                        Err(e) => FieldScore {
                            field: name.clone(),
                            score: 0.0,
                            match_kind: MatchKind::None,
                            explanation: format!("judge unavailable: {}", e),
                            confidence: 0.0,
                            excluded: false,
                        },
                    },
                    None => grade_field(
                        name,
                        exp,
                        act,
                        MatchStrategy::Similarity,
                        spec.required,
                        self.tolerance,
                    ),
                }
            } else {
                grade_field(name, exp, act, spec.strategy, spec.required, self.tolerance)
            };
            scores.insert(name.clone(), score);
        }

        (scores, judge_usage)
    }
}
