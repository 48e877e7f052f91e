use std::collections::BTreeSet;

use serde::Serialize;
use strsim::{jaro_winkler, normalized_levenshtein};

use super::text;

/// Weights of the cross-dataset composite score.
pub const W_JACCARD: f64 = 0.35;
pub const W_PARTIAL: f64 = 0.35;
pub const W_SEQUENCE: f64 = 0.20;
pub const W_PREFIX: f64 = 0.10;

/// All supported similarity metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Sequence,
    TokenSet,
    Partial,
    Jaccard,
    Prefix,
    Composite,
    Levenshtein,
    JaroWinkler,
}

impl Metric {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sequence" | "seq" | "ratio" => Some(Self::Sequence),
            "token-set" | "token_set" | "tokenset" => Some(Self::TokenSet),
            "partial" => Some(Self::Partial),
            "jaccard" | "jac" => Some(Self::Jaccard),
            "prefix" => Some(Self::Prefix),
            "composite" => Some(Self::Composite),
            "levenshtein" | "lev" => Some(Self::Levenshtein),
            "jaro-winkler" | "jaro_winkler" | "jw" => Some(Self::JaroWinkler),
            _ => None,
        }
    }

    pub fn all_names() -> &'static [&'static str] {
        &[
            "sequence",
            "token-set",
            "partial",
            "jaccard",
            "prefix",
            "composite",
            "levenshtein",
            "jaro-winkler",
        ]
    }
}

/// Similarity in [0, 1] between two raw strings under `metric`.
/// Inputs are normalized first.
pub fn similarity(a: &str, b: &str, metric: Metric) -> f64 {
    let na = text::normalize(a);
    let nb = text::normalize(b);
    match metric {
        Metric::Sequence => ratio(&na, &nb),
        Metric::TokenSet => token_set_ratio(&na, &nb) / 100.0,
        Metric::Partial => partial_ratio(&na, &nb),
        Metric::Jaccard => jaccard(&text::token_set(&na), &text::token_set(&nb)),
        Metric::Prefix => prefix_overlap(&na, &nb),
        Metric::Composite => composite(a, b).composite,
        Metric::Levenshtein => normalized_levenshtein(&na, &nb),
        Metric::JaroWinkler => jaro_winkler(&na, &nb),
    }
}

/// Indel-normalized sequence ratio: 2·LCS / (|a| + |b|).
///
/// Two empty strings are identical (1.0); one empty string scores 0.0.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    2.0 * lcs_length(a, b) as f64 / total as f64
}

/// LCS length using two-row DP.
fn lcs_length(a: &[char], b: &[char]) -> usize {
    let n = b.len();
    let mut prev = vec![0usize; n + 1];
    let mut curr = vec![0usize; n + 1];
    for ca in a {
        for j in 1..=n {
            curr[j] = if *ca == b[j - 1] {
                prev[j - 1] + 1
            } else {
                curr[j - 1].max(prev[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
        curr.fill(0);
    }
    prev[n]
}

/// Token-set ratio on a 0–100 scale.
///
/// Whitespace tokens of each side are split into the shared set and the two
/// differences; the best sequence ratio among "shared", "shared + only-a" and
/// "shared + only-b" wins. A side whose tokens are a subset of the other's
/// scores 100. Either side empty scores 0.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let shared: Vec<&str> = ta.intersection(&tb).copied().collect();
    let only_a: Vec<&str> = ta.difference(&tb).copied().collect();
    let only_b: Vec<&str> = tb.difference(&ta).copied().collect();

    if !shared.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let sect = shared.join(" ");
    let join = |rest: &[&str]| {
        let rest = rest.join(" ");
        if sect.is_empty() {
            rest
        } else {
            format!("{sect} {rest}")
        }
    };
    let sect_a = join(&only_a);
    let sect_b = join(&only_b);

    let mut best = ratio(&sect_a, &sect_b);
    if !sect.is_empty() {
        best = best.max(ratio(&sect, &sect_a)).max(ratio(&sect, &sect_b));
    }
    best * 100.0
}

/// Best sequence ratio of the shorter string against every equal-length
/// window of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return if long.is_empty() { 1.0 } else { 0.0 };
    }

    let m = short.len();
    let mut best = 0.0f64;
    for start in 0..=(long.len() - m) {
        let score = ratio_chars(&short, &long[start..start + m]);
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }
    best
}

/// Intersection over union of two token sets. Two empty sets score 0.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Fraction of matching leading characters over the shorter string's length.
pub fn prefix_overlap(a: &str, b: &str) -> f64 {
    let shorter = a.chars().count().min(b.chars().count());
    if shorter == 0 {
        return 0.0;
    }
    let common = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count();
    common as f64 / shorter as f64
}

/// Component and weighted scores for a cross-dataset title pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompositeScore {
    pub composite: f64,
    pub jaccard: f64,
    pub partial: f64,
    pub sequence: f64,
    pub prefix: f64,
}

/// Weighted blend of Jaccard, partial, sequence and prefix scores.
pub fn composite(a: &str, b: &str) -> CompositeScore {
    let na = text::normalize(a);
    let nb = text::normalize(b);
    composite_normalized(&na, &nb, &text::token_set(&na), &text::token_set(&nb))
}

/// Composite over already-normalized titles and their token sets, so callers
/// that compare one title against many can tokenize once.
pub fn composite_normalized(
    a: &str,
    b: &str,
    tokens_a: &BTreeSet<String>,
    tokens_b: &BTreeSet<String>,
) -> CompositeScore {
    let jaccard = jaccard(tokens_a, tokens_b);
    let partial = partial_ratio(a, b);
    let sequence = ratio(a, b);
    let prefix = prefix_overlap(a, b);
    CompositeScore {
        composite: W_JACCARD * jaccard + W_PARTIAL * partial + W_SEQUENCE * sequence + W_PREFIX * prefix,
        jaccard,
        partial,
        sequence,
        prefix,
    }
}
