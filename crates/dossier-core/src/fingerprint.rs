use sha2::{Digest, Sha256};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Deterministic key for one extraction input: the prompt version's content
/// hash, the exact evidence set, and the company. Two ProcessingRuns with
/// the same fingerprint saw byte-identical prompts.
pub fn evidence_fingerprint(content_hash: &str, result_ids: &[i64], company: &str) -> String {
    let mut ids = result_ids.to_vec();
    ids.sort_unstable();
    let ids_str = ids
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",");
    sha256_hex(&format!(
        "content={}\nresults={}\ncompany={}",
        content_hash, ids_str, company
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_stable() {
        assert_eq!(sha256_hex("abc"), sha256_hex("abc"));
        assert_ne!(sha256_hex("abc"), sha256_hex("abd"));
        assert_eq!(sha256_hex("abc").len(), 64);
    }

    #[test]
    fn test_evidence_fingerprint_ignores_id_order() {
        let a = evidence_fingerprint("h", &[3, 1, 2], "Acme");
        let b = evidence_fingerprint("h", &[1, 2, 3], "Acme");
        assert_eq!(a, b);
        assert_ne!(a, evidence_fingerprint("h", &[1, 2, 3], "Other"));
    }
}
