//! Word-frequency predictor built from a cleaned corpus
//!
//! Ranks the successors observed after the prompt's last word, falling back
//! to overall word frequency for unknown words and empty prompts. Counts are
//! normalized to probabilities at build time so ranking is a lookup.

use super::{Predictor, PredictorError};
use crate::types::{Prediction, Prompt};
use std::collections::HashMap;

pub struct NgramPredictor {
    successors: HashMap<String, Vec<Prediction>>,
    unigrams: Vec<Prediction>,
}

impl NgramPredictor {
    pub fn from_corpus_text(text: &str) -> Self {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();

        // Successor counts per word. Vec keeps first-seen order so that the
        // stable sort below yields a deterministic tie order.
        let mut successor_counts: HashMap<String, Vec<(String, usize)>> = HashMap::new();
        for window in words.windows(2) {
            let entry = successor_counts.entry(window[0].clone()).or_default();
            match entry.iter_mut().find(|(w, _)| *w == window[1]) {
                Some((_, count)) => *count += 1,
                None => entry.push((window[1].clone(), 1)),
            }
        }

        let mut unigram_counts: Vec<(String, usize)> = Vec::new();
        let mut unigram_index: HashMap<String, usize> = HashMap::new();
        for word in &words {
            match unigram_index.get(word) {
                Some(&i) => unigram_counts[i].1 += 1,
                None => {
                    unigram_index.insert(word.clone(), unigram_counts.len());
                    unigram_counts.push((word.clone(), 1));
                }
            }
        }

        let successors = successor_counts
            .into_iter()
            .map(|(word, counts)| (word, normalize(counts)))
            .collect();
        let unigrams = normalize(unigram_counts);

        tracing::debug!(
            "n-gram predictor built over {} words of context",
            words.len()
        );

        Self {
            successors,
            unigrams,
        }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.unigrams.len()
    }
}

/// Sort by count descending (stable, so first-seen order breaks ties) and
/// scale counts into probabilities.
fn normalize(mut counts: Vec<(String, usize)>) -> Vec<Prediction> {
    let total: usize = counts.iter().map(|(_, c)| *c).sum();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .map(|(token, count)| Prediction::new(token, count as f32 / total as f32))
        .collect()
}

impl Predictor for NgramPredictor {
    fn rank(&self, prompt: &Prompt, top_k: usize) -> Result<Vec<Prediction>, PredictorError> {
        let ranked = match prompt.last() {
            Some(word) => self
                .successors
                .get(&word.to_lowercase())
                .map(Vec::as_slice)
                .unwrap_or(&self.unigrams),
            None => &self.unigrams,
        };
        Ok(ranked.iter().take(top_k).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks_successors_by_frequency() {
        let predictor = NgramPredictor::from_corpus_text("a b a c a b");
        let ranked = predictor
            .rank(&Prompt::from_text("a"), 5)
            .expect("rank succeeds");
        assert_eq!(ranked[0].token, "b");
        assert_eq!(ranked[1].token, "c");
        assert!(ranked[0].probability > ranked[1].probability);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let predictor = NgramPredictor::from_corpus_text("x y x z");
        let ranked = predictor
            .rank(&Prompt::from_text("x"), 5)
            .expect("rank succeeds");
        assert_eq!(ranked[0].token, "y");
        assert_eq!(ranked[1].token, "z");
        assert_eq!(ranked[0].probability, ranked[1].probability);
    }

    #[test]
    fn test_top_k_truncates() {
        let predictor = NgramPredictor::from_corpus_text("a b a c a d");
        let ranked = predictor
            .rank(&Prompt::from_text("a"), 2)
            .expect("rank succeeds");
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_probabilities_are_normalized() {
        let predictor = NgramPredictor::from_corpus_text("a b a c a b");
        let ranked = predictor
            .rank(&Prompt::from_text("a"), 5)
            .expect("rank succeeds");
        let total: f32 = ranked.iter().map(|p| p.probability).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(ranked.iter().all(|p| (0.0..=1.0).contains(&p.probability)));
    }

    #[test]
    fn test_empty_prompt_falls_back_to_unigrams() {
        let predictor = NgramPredictor::from_corpus_text("the the the quick");
        let ranked = predictor
            .rank(&Prompt::new(), 1)
            .expect("rank succeeds");
        assert_eq!(ranked[0].token, "the");
    }

    #[test]
    fn test_unknown_word_falls_back_to_unigrams() {
        let predictor = NgramPredictor::from_corpus_text("the the quick");
        let ranked = predictor
            .rank(&Prompt::from_text("zebra"), 1)
            .expect("rank succeeds");
        assert_eq!(ranked[0].token, "the");
    }

    #[test]
    fn test_empty_corpus_yields_no_candidates() {
        let predictor = NgramPredictor::from_corpus_text("");
        let ranked = predictor
            .rank(&Prompt::from_text("anything"), 3)
            .expect("rank succeeds");
        assert!(ranked.is_empty());
        assert_eq!(predictor.vocabulary_size(), 0);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let predictor = NgramPredictor::from_corpus_text("The quick The quick");
        let ranked = predictor
            .rank(&Prompt::from_text("THE"), 1)
            .expect("rank succeeds");
        assert_eq!(ranked[0].token, "quick");
    }
}
