//! Single-step operations over a predictor: rank candidates, append the top one

use super::{GenerationConfig, GenerationSession};
use crate::predictor::{Predictor, PredictorError};
use crate::types::{Prediction, Prompt};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum GenerateError {
    /// The caller asked for zero candidates. The predictor is never invoked.
    #[error("top_k must be at least 1")]
    InvalidTopK,

    #[error(transparent)]
    Predictor(#[from] PredictorError),
}

/// Result of trying to extend a prompt by one word.
#[derive(Debug)]
pub enum AppendOutcome {
    /// The top candidate was appended.
    Appended(Prompt),
    /// The predictor had no candidates; the prompt is returned unchanged.
    Exhausted(Prompt),
}

/// Stateless front over a shared predictor.
///
/// Cloning is cheap; every clone ranks against the same predictor.
#[derive(Clone)]
pub struct Generator {
    predictor: Arc<dyn Predictor>,
}

impl Generator {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self { predictor }
    }

    /// Rank up to `top_k` next-word candidates for the prompt.
    pub fn rank(&self, prompt: &Prompt, top_k: usize) -> Result<Vec<Prediction>, GenerateError> {
        if top_k == 0 {
            return Err(GenerateError::InvalidTopK);
        }
        Ok(self.predictor.rank(prompt, top_k)?)
    }

    /// Extend the prompt with the single highest-ranked candidate.
    pub fn append_next(&self, mut prompt: Prompt) -> Result<AppendOutcome, GenerateError> {
        let candidates = self.rank(&prompt, 1)?;
        match candidates.into_iter().next() {
            Some(prediction) => {
                prompt.push(prediction.token);
                Ok(AppendOutcome::Appended(prompt))
            }
            None => Ok(AppendOutcome::Exhausted(prompt)),
        }
    }

    /// Start an auto-generation run from `prompt`.
    pub fn session(
        &self,
        prompt: Prompt,
        config: GenerationConfig,
        cancel: CancellationToken,
    ) -> GenerationSession {
        GenerationSession::new(Arc::clone(&self.predictor), prompt, config, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedPredictor {
        candidates: Vec<Prediction>,
        calls: AtomicUsize,
    }

    impl FixedPredictor {
        fn new(candidates: Vec<Prediction>) -> Self {
            Self {
                candidates,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Predictor for FixedPredictor {
        fn rank(&self, _prompt: &Prompt, top_k: usize) -> Result<Vec<Prediction>, PredictorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.candidates.iter().take(top_k).cloned().collect())
        }
    }

    struct FailingPredictor;

    impl Predictor for FailingPredictor {
        fn rank(&self, _prompt: &Prompt, _top_k: usize) -> Result<Vec<Prediction>, PredictorError> {
            Err(PredictorError::unavailable("model not loaded"))
        }
    }

    #[test]
    fn test_zero_top_k_rejected_without_calling_predictor() {
        let predictor = Arc::new(FixedPredictor::new(vec![Prediction::new("fox", 0.8)]));
        let generator = Generator::new(predictor.clone());

        let result = generator.rank(&Prompt::from_text("the"), 0);
        assert!(matches!(result, Err(GenerateError::InvalidTopK)));
        assert_eq!(predictor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rank_passes_candidates_through() {
        let predictor = Arc::new(FixedPredictor::new(vec![
            Prediction::new("brown", 0.6),
            Prediction::new("lazy", 0.3),
        ]));
        let generator = Generator::new(predictor);

        let ranked = generator
            .rank(&Prompt::from_text("the quick"), 5)
            .expect("rank succeeds");
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].token, "brown");
    }

    #[test]
    fn test_append_next_takes_top_candidate() {
        let predictor = Arc::new(FixedPredictor::new(vec![
            Prediction::new("brown", 0.6),
            Prediction::new("lazy", 0.3),
        ]));
        let generator = Generator::new(predictor);

        match generator
            .append_next(Prompt::from_text("the quick"))
            .expect("append succeeds")
        {
            AppendOutcome::Appended(prompt) => {
                assert_eq!(prompt.to_string(), "the quick brown");
            }
            AppendOutcome::Exhausted(_) => panic!("expected a word to be appended"),
        }
    }

    #[test]
    fn test_append_next_is_deterministic() {
        let predictor = Arc::new(FixedPredictor::new(vec![Prediction::new("fox", 0.8)]));
        let generator = Generator::new(predictor);

        for _ in 0..3 {
            match generator
                .append_next(Prompt::from_text("the quick brown"))
                .expect("append succeeds")
            {
                AppendOutcome::Appended(prompt) => {
                    assert_eq!(prompt.to_string(), "the quick brown fox");
                }
                AppendOutcome::Exhausted(_) => panic!("expected a word to be appended"),
            }
        }
    }

    #[test]
    fn test_append_next_without_candidates_leaves_prompt_unchanged() {
        let predictor = Arc::new(FixedPredictor::new(Vec::new()));
        let generator = Generator::new(predictor);

        match generator
            .append_next(Prompt::from_text("the quick"))
            .expect("append succeeds")
        {
            AppendOutcome::Exhausted(prompt) => {
                assert_eq!(prompt.to_string(), "the quick");
            }
            AppendOutcome::Appended(_) => panic!("expected exhaustion"),
        }
    }

    #[test]
    fn test_predictor_failure_propagates() {
        let generator = Generator::new(Arc::new(FailingPredictor));
        let result = generator.rank(&Prompt::from_text("the"), 3);
        assert!(matches!(result, Err(GenerateError::Predictor(_))));
    }
}
