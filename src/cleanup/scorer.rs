//! Text similarity scoring for phrase cleanup.

use std::collections::HashMap;

/// Similarity between two short texts, in `0.0..=1.0`.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, text: &str, reference: &str) -> f32;
}

/// Bag-of-words cosine similarity over lowercased alphanumeric tokens.
///
/// Purely lexical: paraphrases that share no words score zero.
///
/// # Example
/// ```rust
/// use doc_transcribe::cleanup::{SimilarityScorer, TokenCosineScorer};
///
/// let scorer = TokenCosineScorer::new();
/// assert!(scorer.score("Here is the text", "here is the TEXT") > 0.99);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCosineScorer;

impl TokenCosineScorer {
    pub fn new() -> Self {
        Self
    }
}

fn token_counts(text: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_lowercase()).or_insert(0) += 1;
    }
    counts
}

fn norm(counts: &HashMap<String, u32>) -> f32 {
    counts
        .values()
        .map(|&n| (n as f32).powi(2))
        .sum::<f32>()
        .sqrt()
}

impl SimilarityScorer for TokenCosineScorer {
    fn score(&self, text: &str, reference: &str) -> f32 {
        let a = token_counts(text);
        let b = token_counts(reference);
        let denom = norm(&a) * norm(&b);
        if denom == 0.0 {
            return 0.0;
        }
        let dot: f32 = a
            .iter()
            .filter_map(|(token, &n)| b.get(token).map(|&m| n as f32 * m as f32))
            .sum();
        (dot / denom).min(1.0)
    }
}
