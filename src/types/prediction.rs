use serde::{Deserialize, Serialize};

/// One ranked next-word candidate returned by a predictor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub token: String,
    /// Probability in [0, 1]; candidate lists are sorted descending.
    pub probability: f32,
}

impl Prediction {
    pub fn new(token: impl Into<String>, probability: f32) -> Self {
        Self {
            token: token.into(),
            probability,
        }
    }
}
