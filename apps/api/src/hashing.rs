//! Content fingerprints and token sets.
//!
//! Job text is normalised before hashing (NFKC, whitespace runs collapsed,
//! trimmed, lower-cased) so that copies differing only in layout or case hash
//! identically. Resume files are hashed over their raw bytes.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Canonical form of a job description body.
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfkc().collect();
    composed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hex SHA-256 of the normalised text.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(normalize(text).as_bytes()))
}

/// Hex SHA-256 of raw file bytes.
pub fn file_checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Distinct alphanumeric word tokens of the normalised text.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard index |A ∩ B| / |A ∪ B|; 0.0 when both sets are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_and_case_do_not_change_hash() {
        let a = "Senior Rust Engineer\n\nBuild   storage engines.";
        let b = "  senior rust ENGINEER build\tstorage engines.  ";
        assert_eq!(content_hash(a), content_hash(b));
    }

    #[test]
    fn test_different_words_change_hash() {
        assert_ne!(content_hash("rust engineer"), content_hash("go engineer"));
    }

    #[test]
    fn test_unicode_compatibility_forms_hash_equal() {
        // U+FB01 LATIN SMALL LIGATURE FI decomposes to "fi" under NFKC.
        assert_eq!(content_hash("\u{FB01}nance"), content_hash("finance"));
    }

    #[test]
    fn test_hash_is_fixed_length_hex() {
        let h = content_hash("anything");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_file_checksum_is_byte_exact() {
        assert_ne!(file_checksum(b"Resume"), file_checksum(b"resume"));
        assert_eq!(file_checksum(b"abc"), file_checksum(b"abc"));
    }

    #[test]
    fn test_tokenize_splits_on_punctuation() {
        let tokens = tokenize("Acme_SWE-2024.pdf");
        let expected: BTreeSet<String> = ["acme", "swe", "2024", "pdf"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_jaccard_bounds() {
        let a = tokenize("rust tokio axum");
        let b = tokenize("rust tokio serde");
        // |{rust, tokio}| / |{rust, tokio, axum, serde}| = 0.5
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }
}
