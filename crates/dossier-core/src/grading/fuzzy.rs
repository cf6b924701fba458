use crate::model::{FieldScore, MatchKind};
use regex::Regex;
use std::sync::OnceLock;

fn integer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

fn thousands_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d),(\d)").unwrap())
}

/// Pulls every integer out of free text, separator style notwithstanding:
/// "51-200", "51 to 200" and "51–200" all yield [51, 200]. Thousands
/// separators are folded first so "1,200" reads as one number.
pub fn extract_integers(text: &str) -> Vec<i64> {
    let folded = thousands_re().replace_all(text, "${1}${2}");
    integer_re()
        .find_iter(&folded)
        .filter_map(|m| m.as_str().parse::<i64>().ok())
        .collect()
}

/// Numeric-range overlap grading.
///
/// The expected values span an interval of width `w`, symmetrically expanded
/// by `tolerance * w` on both sides. Confidence is the length of the overlap
/// between the expanded interval and the actual interval, divided by `w` and
/// clamped to [0, 1]. A zero-width interval (a lone number) matches with
/// full confidence when it falls inside the other interval.
pub fn grade(field: &str, expected: &str, actual: &str, tolerance: f64) -> FieldScore {
    let e_nums = extract_integers(expected);
    let a_nums = extract_integers(actual);

    if e_nums.is_empty() || a_nums.is_empty() {
        return FieldScore {
            field: field.to_string(),
            score: 0.0,
            match_kind: MatchKind::None,
            explanation: format!(
                "could not extract a number from {}",
                if e_nums.is_empty() { "expected" } else { "actual" }
            ),
            confidence: 0.0,
            excluded: false,
        };
    }

    let e_min = *e_nums.iter().min().unwrap() as f64;
    let e_max = *e_nums.iter().max().unwrap() as f64;
    let a_min = *a_nums.iter().min().unwrap() as f64;
    let a_max = *a_nums.iter().max().unwrap() as f64;

    let w = e_max - e_min;
    let lo = e_min - tolerance * w;
    let hi = e_max + tolerance * w;

    // Degenerate intervals: overlap length is meaningless, containment is
    // the signal.
    if w == 0.0 || a_min == a_max {
        let contained = if w == 0.0 {
            a_min <= e_min && e_min <= a_max
        } else {
            lo <= a_min && a_min <= hi
        };
        return if contained {
            FieldScore {
                field: field.to_string(),
                score: 100.0,
                match_kind: if e_min == a_min && e_max == a_max {
                    MatchKind::Exact
                } else {
                    MatchKind::Semantic
                },
                explanation: format!(
                    "point value within range (expected {}-{}, actual {}-{})",
                    e_min, e_max, a_min, a_max
                ),
                confidence: 1.0,
                excluded: false,
            }
        } else {
            FieldScore {
                field: field.to_string(),
                score: 0.0,
                match_kind: MatchKind::None,
                explanation: format!(
                    "point value outside range (expected {}-{}, actual {}-{})",
                    e_min, e_max, a_min, a_max
                ),
                confidence: 0.0,
                excluded: false,
            }
        };
    }

    let overlap = hi.min(a_max) - lo.max(a_min);
    if overlap <= 0.0 {
        return FieldScore {
            field: field.to_string(),
            score: 0.0,
            match_kind: MatchKind::None,
            explanation: format!(
                "ranges do not overlap (expected {}-{} expanded to {:.0}-{:.0}, actual {}-{})",
                e_min, e_max, lo, hi, a_min, a_max
            ),
            confidence: 0.0,
            excluded: false,
        };
    }

    let confidence = (overlap / w).clamp(0.0, 1.0);
    FieldScore {
        field: field.to_string(),
        score: confidence * 100.0,
        match_kind: if confidence >= 0.999 {
            MatchKind::Exact
        } else {
            MatchKind::Partial
        },
        explanation: format!(
            "range overlap {:.0} of expected width {:.0}",
            overlap, w
        ),
        confidence,
        excluded: false,
    }
}
