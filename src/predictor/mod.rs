//! Predictor capability: maps a prompt to ranked next-word candidates
//!
//! The generation core only depends on this trait. Everything model-specific
//! (preprocessing, padding, vocabulary handling) stays behind it.

pub mod corpus;
mod ngram;

pub use ngram::NgramPredictor;

use crate::types::{Prediction, Prompt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("predictor unavailable: {reason}")]
    Unavailable { reason: String },
}

impl PredictorError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Ranked next-word prediction.
///
/// Implementations return at most `top_k` candidates sorted by descending
/// probability, with ties broken in a stable order. Returning fewer
/// candidates than requested (including none at all) is normal, not an
/// error; failures of the capability itself are reported as
/// [`PredictorError`].
pub trait Predictor: Send + Sync {
    fn rank(&self, prompt: &Prompt, top_k: usize) -> Result<Vec<Prediction>, PredictorError>;
}
