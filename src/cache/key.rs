use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Prompt normalization
// ---------------------------------------------------------------------------

/// Trim, lowercase and collapse every whitespace run to a single space.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Fingerprint (SHA-256 of kind:locale:normalized)
// ---------------------------------------------------------------------------

/// Deterministic hex SHA-256 fingerprint of a request.
///
/// Kind and locale are part of the key, so the same text under a different
/// kind or locale never collides.
pub fn fingerprint(kind: &str, locale: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b":");
    hasher.update(locale.as_bytes());
    hasher.update(b":");
    hasher.update(normalize_prompt(prompt).as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
