use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Boilerplate phrases that say what kind of work a project is, not where or
/// what it is. Longest first so alternation prefers the longer phrase.
pub const GENERIC_PHRASES: &[&str] = &[
    "flood control structure",
    "construction of",
    "rehabilitation of",
    "improvement of",
    "repair of",
    "flood control",
    "river control",
    "slope protection",
    "construction",
    "rehabilitation",
    "improvement",
    "repair",
    "revetment",
    "desilting",
    "dredging",
    "riprap",
    "drainage",
];

static GENERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = GENERIC_PHRASES
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b")).expect("generic phrase pattern is valid")
});

/// Canonicalize free text: lowercase, replace anything outside alphanumerics,
/// whitespace and `- / , _ ( ) & .` with a space, collapse whitespace, trim.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || "-/,_()&.".contains(c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize an optional value; missing input is the empty string.
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

/// Normalize, split into words, and drop stop tokens. Order is preserved.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .unicode_words()
        .filter(|w| !is_stop_token(w))
        .map(str::to_string)
        .collect()
}

/// Distinct tokens of `text`, sorted.
pub fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Remove generic work-type phrases so two titles are compared on what
/// actually distinguishes them.
pub fn strip_generic_phrases(text: &str) -> String {
    let norm = normalize(text);
    let stripped = GENERIC_RE.replace_all(&norm, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True for single-word generic phrases ("revetment", "drainage", ...).
pub fn is_generic_token(token: &str) -> bool {
    GENERIC_PHRASES.contains(&token)
}

/// Tokens that can anchor a duplicate: not generic and longer than 2 chars.
pub fn distinguishing_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> usize {
    a.intersection(b)
        .filter(|t| t.chars().count() > 2 && !is_generic_token(t))
        .count()
}

fn is_stop_token(word: &str) -> bool {
    matches!(
        word,
        "a" | "an" | "the" | "of" | "and" | "for" | "to" | "in" | "on" | "at" | "by"
        | "with" | "phase" | "package" | "lot" | "section" | "stage" | "barangay"
        | "brgy" | "city" | "municipality" | "province" | "region" | "lgu" | "dpwh"
        | "river" | "creek" | "canal" | "drainage" | "construction"
    )
}
