//! Incremental text generation built on top of a [`Predictor`](crate::Predictor)
//!
//! The generator extends a prompt one word at a time by taking the top-ranked
//! candidate. Auto-generation runs as a pull-based session: each call to
//! [`GenerationSession::advance`] produces at most one snapshot, so pacing and
//! delivery stay with the caller.

mod generator;
mod session;

pub use generator::{AppendOutcome, GenerateError, Generator};
pub use session::{GenerationSession, Snapshot, StopReason};

/// Limits applied to an auto-generation run.
#[derive(Debug, Clone, Copy)]
pub struct GenerationConfig {
    /// Maximum number of words appended in one run.
    pub max_words: usize,
    /// Stop the run when a word generated earlier in the same run comes up
    /// again.
    pub stop_on_repeat: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_words: 10,
            stop_on_repeat: true,
        }
    }
}
