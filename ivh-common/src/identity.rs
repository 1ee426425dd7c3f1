//! Collision-free environment identities.
//!
//! One generator per process hands out names built from the scenario's
//! base name, a monotonic counter, and a random suffix. The identity is
//! also the engine workspace key, so uniqueness here is what keeps
//! parallel applies out of each other's state files.

use crate::types::EnvironmentId;
use rand::RngExt;
use std::sync::atomic::{AtomicU64, Ordering};

const SUFFIX_LEN: usize = 6;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Process-wide identity allocator.
///
/// The counter alone makes identities unique within a process; the random
/// suffix keeps two harness processes pointed at the same configuration
/// root from colliding.
#[derive(Debug, Default)]
pub struct IdentityGenerator {
    counter: AtomicU64,
}

impl IdentityGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next identity for `base`.
    ///
    /// Safe to call from any number of tasks concurrently; the counter
    /// increment is atomic so no two callers ever observe the same value.
    pub fn next(&self, base: &str) -> EnvironmentId {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let suffix = random_suffix();
        EnvironmentId::new(format!("{}-{}-{}", sanitize(base), seq, suffix))
    }
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| {
            let idx = rng.random_range(0..SUFFIX_ALPHABET.len());
            SUFFIX_ALPHABET[idx] as char
        })
        .collect()
}

/// Engine workspace names and cloud labels reject most punctuation; fold
/// everything outside [a-z0-9-] to '-'. A base with no usable characters
/// falls back to `env` so the identity never starts with a hyphen.
fn sanitize(base: &str) -> String {
    let folded: String = base
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let trimmed = folded.trim_matches('-');
    if trimmed.is_empty() {
        "env".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_identity_contains_base_and_sequence() {
        let generator = IdentityGenerator::new();
        let id = generator.next("baseline");
        assert!(id.as_str().starts_with("baseline-1-"));
        let id2 = generator.next("baseline");
        assert!(id2.as_str().starts_with("baseline-2-"));
    }

    #[test]
    fn test_sanitize_folds_invalid_characters() {
        let generator = IdentityGenerator::new();
        let id = generator.next("Multi Server_Test!");
        assert!(id.as_str().starts_with("multi-server-test-1-"));
    }

    #[test]
    fn test_all_punctuation_base_falls_back_to_fixed_prefix() {
        let generator = IdentityGenerator::new();
        let id = generator.next("!!!");
        assert!(id.as_str().starts_with("env-1-"), "{id}");
        assert!(!id.as_str().starts_with('-'));
    }

    #[test]
    fn test_concurrent_identities_are_pairwise_distinct() {
        let generator = Arc::new(IdentityGenerator::new());
        let mut handles = Vec::new();
        for _ in 0..1000 {
            let generator = generator.clone();
            handles.push(std::thread::spawn(move || generator.next("stress")));
        }
        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let distinct: HashSet<_> = ids.iter().map(|id| id.as_str().to_string()).collect();
        assert_eq!(distinct.len(), 1000, "identities must never collide");
    }

    #[test]
    fn test_suffix_is_lowercase_alphanumeric() {
        let generator = IdentityGenerator::new();
        let id = generator.next("baseline");
        let suffix = id.as_str().rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }
}
