// Content hash — the enrichment cache key.
//
// SHA-256 over a canonical JSON encoding of the sorted member ids, the
// ordered fingerprint and the representative id. Any membership change, any
// fingerprint change, or a new representative yields a new hash.

use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
struct HashInput<'a> {
    member_doc_ids: Vec<&'a str>,
    fingerprint: &'a [String],
    representative_doc_id: &'a str,
}

/// Lowercase hex SHA-256 of the cluster's content.
pub fn content_hash(member_doc_ids: &[String], fingerprint: &[String], representative_doc_id: &str) -> String {
    let mut members: Vec<&str> = member_doc_ids.iter().map(String::as_str).collect();
    members.sort_unstable();

    let input = HashInput {
        member_doc_ids: members,
        fingerprint,
        representative_doc_id,
    };
    // Serializing plain strings and vectors cannot fail.
    let canonical = serde_json::to_vec(&input).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hash_is_order_insensitive_for_members() {
        let fp = ids(&["kale", "salad"]);
        let a = content_hash(&ids(&["d1", "d2", "d3"]), &fp, "d2");
        let b = content_hash(&ids(&["d3", "d1", "d2"]), &fp, "d2");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_any_component() {
        let fp = ids(&["kale", "salad"]);
        let base = content_hash(&ids(&["d1", "d2"]), &fp, "d1");
        assert_ne!(base, content_hash(&ids(&["d1", "d9"]), &fp, "d1"));
        assert_ne!(base, content_hash(&ids(&["d1", "d2"]), &ids(&["salad", "kale"]), "d1"));
        assert_ne!(base, content_hash(&ids(&["d1", "d2"]), &fp, "d2"));
    }
}
