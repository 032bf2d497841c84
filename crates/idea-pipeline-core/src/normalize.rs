//! Idea text normalization and content fingerprinting.
//!
//! Two submissions that differ only in letter case or surrounding
//! whitespace describe the same idea. Normalization folds those
//! differences away, and the fingerprint (SHA-256 over
//! `"{title}\n{description}"`, lowercase hex) becomes the key for the
//! analysis cache.
//!
//! # Example
//!
//! ```rust
//! use idea_pipeline_core::normalize::normalize_idea;
//!
//! let (a, fa) = normalize_idea("  Pet Rocks ", "Rocks, but as pets.");
//! let (_, fb) = normalize_idea("pet rocks", "  ROCKS, BUT AS PETS.\n");
//! assert_eq!(a.title, "pet rocks");
//! assert_eq!(fa, fb);
//! assert_eq!(fa.len(), 64);
//! ```

use sha2::{Digest, Sha256};

use crate::models::NormalizedText;

/// Trim and lower-case a title and description.
pub fn normalize_text(title: &str, description: &str) -> NormalizedText {
    NormalizedText {
        title: title.trim().to_lowercase(),
        description: description.trim().to_lowercase(),
    }
}

/// SHA-256 of the normalized title and description joined by a newline.
pub fn fingerprint(text: &NormalizedText) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.title.as_bytes());
    hasher.update(b"\n");
    hasher.update(text.description.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Normalize raw idea text and derive its fingerprint in one step.
pub fn normalize_idea(title: &str, description: &str) -> (NormalizedText, String) {
    let normalized = normalize_text(title, description);
    let hash = fingerprint(&normalized);
    (normalized, hash)
}
