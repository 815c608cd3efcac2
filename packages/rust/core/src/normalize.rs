//! Title normalization for fuzzy comparison.

use std::sync::LazyLock;

use regex::Regex;

/// Canonical comparison form of a book title.
///
/// Lowercases, drops everything from the first colon on (the subtitle),
/// strips characters that are neither word characters nor whitespace,
/// collapses whitespace runs to one space, and trims.
pub fn normalize_title(title: &str) -> String {
    static PUNCT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));
    static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let lower = title.to_lowercase();
    let head = lower.split(':').next().unwrap_or_default();
    let stripped = PUNCT_RE.replace_all(head, "");
    SPACE_RE.replace_all(&stripped, " ").trim().to_string()
}
