use std::sync::Arc;

use once_cell::sync::Lazy;

/// Scores how alike two free-text names are, on a 0..=100 scale.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Token-order-insensitive ratio: both sides are normalized, their tokens sorted,
/// then compared with normalized Levenshtein similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSortRatio;

impl SimilarityScorer for TokenSortRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a = token_sort_key(a);
        let b = token_sort_key(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 100.0;
        }
        strsim::normalized_levenshtein(&a, &b) * 100.0
    }
}

static DEFAULT_SCORER: Lazy<Arc<dyn SimilarityScorer>> = Lazy::new(|| Arc::new(TokenSortRatio));

pub fn default_scorer() -> Arc<dyn SimilarityScorer> {
    Arc::clone(&DEFAULT_SCORER)
}

/// Lowercase, drop punctuation, fold runs of whitespace.
pub fn normalize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else if c.is_whitespace() || c == '-' || c == '_' {
                ' '
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn tokens(raw: &str) -> Vec<String> {
    normalize_name(raw)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn token_sort_key(raw: &str) -> String {
    let mut parts = tokens(raw);
    parts.sort_unstable();
    parts.join(" ")
}

/// Numeric tokens of a title ("East vs West 15" -> ["15"]), used to keep
/// numbered event names from fuzzily matching their neighbours.
pub fn numeric_tokens(raw: &str) -> Vec<String> {
    tokens(raw)
        .into_iter()
        .filter(|t| t.chars().any(|c| c.is_ascii_digit()))
        .map(|t| t.chars().filter(|c| c.is_ascii_digit()).collect())
        .collect()
}

/// Event titles match when they score at or above `threshold` and carry the
/// same numeric tokens.
pub fn titles_match(scorer: &dyn SimilarityScorer, a: &str, b: &str, threshold: f64) -> bool {
    if normalize_name(a).is_empty() || normalize_name(b).is_empty() {
        return false;
    }
    numeric_tokens(a) == numeric_tokens(b) && scorer.score(a, b) >= threshold
}
