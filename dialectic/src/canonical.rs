//! Canonical text normalization and hashing.
//!
//! Every dedup and cache key in the engine is built from these helpers, so
//! they are deliberately small and dependency-free apart from the digest.
//! Keys are hex SHA-256 digests of canonicalized text; truncated forms are
//! used where the key doubles as a human-scannable id.

use itertools::Itertools;
use sha2::{Digest, Sha256};

use crate::task::Span;

/// Length of truncated digests used for ids and dedup keys.
pub const SHORT_KEY_LEN: usize = 24;

/// Normalize text for stable hashing: lowercase, strip punctuation,
/// collapse whitespace runs to single spaces, trim.
///
/// Applied to entity names, claim text and prompt text before hashing.
pub fn canonicalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    stripped.split_whitespace().join(" ")
}

/// Full hex SHA-256 of the canonicalized text.
pub fn canonical_hash(text: &str) -> String {
    hex_digest(canonicalize_text(text).as_bytes())
}

/// Truncated canonical hash for ids and dedup keys.
pub fn canonical_hash_short(text: &str) -> String {
    let mut h = canonical_hash(text);
    h.truncate(SHORT_KEY_LEN);
    h
}

/// Dedup key for entity registration. Entities with the same canonical
/// name share a key and are merged, never duplicated.
pub fn entity_dedup_key(canonical_name: &str) -> String {
    canonical_hash_short(canonical_name)
}

/// Dedup key for claim emission.
///
/// The span is part of claim identity: the same text at a different
/// position is a distinct claim.
pub fn claim_dedup_key(text: &str, span: Span) -> String {
    let combined = format!("{}:{}:{}", canonical_hash(text), span.start, span.end);
    let mut h = hex_digest(combined.as_bytes());
    h.truncate(SHORT_KEY_LEN);
    h
}

/// Cache key for external model calls.
///
/// The schema version and model identifier are part of the key, so schema
/// or model changes invalidate stale cache entries by construction.
pub fn model_cache_key(prompt: &str, schema_version: &str, model: &str) -> String {
    let combined = format!("v{}:{}:{}", schema_version, model, canonicalize_text(prompt));
    hex_digest(combined.as_bytes())
}

/// Hex SHA-256 of raw bytes. Shared by the key builders above and the
/// task dedup key.
pub fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_lowercases_and_trims() {
        assert_eq!(canonicalize_text("  Hello   World  "), "hello world");
    }

    #[test]
    fn test_canonicalize_strips_punctuation() {
        assert_eq!(
            canonicalize_text("Unemployment decreased by 15%."),
            "unemployment decreased by 15"
        );
        assert_eq!(canonicalize_text("a - b"), "a b");
    }

    #[test]
    fn test_canonical_hash_stable_under_formatting() {
        assert_eq!(
            canonical_hash("The STUDY shows..."),
            canonical_hash("the study   shows")
        );
    }

    #[test]
    fn test_claim_key_is_span_sensitive() {
        let text = "Unemployment decreased by 15%.";
        let a = claim_dedup_key(text, Span::new(0, 30));
        let b = claim_dedup_key(text, Span::new(5, 35));
        assert_ne!(a, b);
        assert_eq!(a, claim_dedup_key(text, Span::new(0, 30)));
    }

    #[test]
    fn test_entity_key_merges_aliases_by_case() {
        assert_eq!(entity_dedup_key("Dr. Smith"), entity_dedup_key("dr smith"));
        assert_eq!(entity_dedup_key("x").len(), SHORT_KEY_LEN);
    }

    #[test]
    fn test_model_cache_key_varies_with_schema_and_model() {
        let base = model_cache_key("classify this", "1", "m-small");
        assert_ne!(base, model_cache_key("classify this", "2", "m-small"));
        assert_ne!(base, model_cache_key("classify this", "1", "m-large"));
        assert_eq!(base, model_cache_key("Classify   THIS!", "1", "m-small"));
    }
}
