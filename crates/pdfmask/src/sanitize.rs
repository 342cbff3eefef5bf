//! Helpers for keeping document names and credentials out of log output.
//!
//! Submitted documents are sensitive by nature (that is why they are being
//! redacted), so logs carry a shortened name or a stable hash instead.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

const MAX_NAME_CHARS: usize = 24;

/// Returns the final path component, shortened to a bounded length.
///
/// `/Users/ann/Contracts/settlement-agreement-final-v3.pdf` → `settlement-agree….pdf`
pub fn redact_filename(name: &str) -> String {
    let file = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>");

    if file.chars().count() <= MAX_NAME_CHARS {
        return file.to_string();
    }

    let (stem, ext) = match file.rfind('.') {
        Some(pos) if pos > 0 => (&file[..pos], &file[pos..]),
        _ => (file, ""),
    };
    let keep = MAX_NAME_CHARS.saturating_sub(ext.chars().count() + 1).max(1);
    let head: String = stem.chars().take(keep).collect();
    format!("{}…{}", head, ext)
}

/// Short deterministic hash for correlating log lines without exposing a value.
pub fn fingerprint(value: &str) -> String {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Joins redaction terms for logging: count only, never the terms themselves.
pub fn describe_terms(terms: &[String]) -> String {
    match terms.len() {
        1 => "1 term".to_string(),
        n => format!("{} terms", n),
    }
}
