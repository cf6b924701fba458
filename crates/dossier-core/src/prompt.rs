use crate::fields::FieldRegistry;
use crate::fingerprint::sha256_hex;
use crate::model::{PromptVersion, SearchResult};

pub const TRUNCATION_MARKER: &str = "\n[... evidence truncated ...]";

impl PromptVersion {
    /// Renders the full instructions document (instructions plus the schema
    /// hints for `registry`) and content-addresses it. Identical content
    /// always yields an identical hash.
    pub fn new(name: &str, version: &str, instructions: &str, registry: &FieldRegistry) -> Self {
        let content = format!("{}\n\n{}", instructions.trim_end(), registry.schema_hints());
        let content_hash = sha256_hex(&content);
        Self {
            id: 0,
            name: name.to_string(),
            version: version.to_string(),
            instructions: instructions.to_string(),
            content,
            content_hash,
            active: true,
        }
    }
}

/// Deterministically combines a prompt version with the accumulated search
/// evidence: instructions, evidence blocks in search-result id order, then
/// the closing directive naming the company.
///
/// For a fixed (content_hash, search result ids, company,
/// per-result budget) this returns byte-identical output.
pub fn build(
    prompt_version: &PromptVersion,
    search_results: &[SearchResult],
    company: &str,
    result_char_budget: Option<usize>,
) -> String {
    let mut results: Vec<&SearchResult> = search_results.iter().collect();
    results.sort_by_key(|r| r.id);

    let mut out = String::new();
    out.push_str(&prompt_version.content);
    out.push_str("\n\n=== SEARCH EVIDENCE ===\n");
    for r in &results {
        out.push_str(&format!("\n--- result {} ({}) ---\n", r.id, r.provider));
        let raw = r.raw_json.to_string();
        match result_char_budget {
            Some(budget) if raw.len() > budget => {
                // Truncate on a char boundary; the marker makes the cut
                // explicit so the rendered prompt stays self-describing.
                let mut cut = budget;
                while !raw.is_char_boundary(cut) {
                    cut -= 1;
                }
                out.push_str(&raw[..cut]);
                out.push_str(TRUNCATION_MARKER);
            }
            _ => out.push_str(&raw),
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "\n=== TASK ===\nExtract the profile of the company \"{}\" from the evidence above.\n",
        company
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: i64, payload: &str) -> SearchResult {
        SearchResult {
            id,
            query_id: id,
            provider: "fake".into(),
            raw_json: serde_json::json!({ "snippet": payload }),
            result_count: 1,
            latency_ms: 5,
            success: true,
            error: None,
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let pv = PromptVersion::new(
            "company-profile",
            "v1",
            "Extract company facts.",
            &FieldRegistry::company_profile(),
        );
        let results = vec![result(2, "b"), result(1, "a")];
        let a = build(&pv, &results, "Acme", None);
        let b = build(&pv, &results, "Acme", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_build_orders_evidence_by_id() {
        let pv = PromptVersion::new(
            "p",
            "v1",
            "Instructions.",
            &FieldRegistry::company_profile(),
        );
        let shuffled = vec![result(3, "c"), result(1, "a"), result(2, "b")];
        let sorted = vec![result(1, "a"), result(2, "b"), result(3, "c")];
        assert_eq!(
            build(&pv, &shuffled, "Acme", None),
            build(&pv, &sorted, "Acme", None)
        );
    }

    #[test]
    fn test_build_truncates_with_marker() {
        let pv = PromptVersion::new(
            "p",
            "v1",
            "Instructions.",
            &FieldRegistry::company_profile(),
        );
        let big = "x".repeat(10_000);
        let rendered = build(&pv, &[result(1, &big)], "Acme", Some(100));
        assert!(rendered.contains(TRUNCATION_MARKER));
        // Deterministic under the same budget.
        assert_eq!(rendered, build(&pv, &[result(1, &big)], "Acme", Some(100)));
    }

    #[test]
    fn test_content_hash_is_pure_function_of_content() {
        let reg = FieldRegistry::company_profile();
        let a = PromptVersion::new("a", "v1", "Same text.", &reg);
        let b = PromptVersion::new("b", "v9", "Same text.", &reg);
        assert_eq!(a.content_hash, b.content_hash);

        let c = PromptVersion::new("a", "v1", "Different text.", &reg);
        assert_ne!(a.content_hash, c.content_hash);
    }
}
