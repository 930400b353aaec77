//! Pull-based auto-generation run
//!
//! A session owns the evolving prompt and yields one snapshot per
//! [`advance`](GenerationSession::advance) call. The caller decides the
//! cadence between steps; cancellation is observed at step boundaries, so a
//! cancelled run never loses words that were already appended.

use super::GenerationConfig;
use crate::predictor::Predictor;
use crate::types::Prompt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::GenerateError;

/// Why an auto-generation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured word limit was reached.
    Limit,
    /// The run was cancelled between steps.
    Cancelled,
    /// The predictor returned no candidates.
    Exhausted,
    /// The top candidate was already generated earlier in this run.
    Repeat,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::Cancelled => "cancelled",
            Self::Exhausted => "exhausted",
            Self::Repeat => "repeat",
        }
    }
}

/// State of the prompt after one successful step.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// 1-based index of the step that produced this snapshot.
    pub step: usize,
    /// The word appended at this step.
    pub word: String,
    /// The full prompt including the appended word.
    pub prompt: Prompt,
}

pub struct GenerationSession {
    predictor: Arc<dyn Predictor>,
    config: GenerationConfig,
    cancel: CancellationToken,
    prompt: Prompt,
    step: usize,
    generated: HashSet<String>,
    stop_reason: Option<StopReason>,
}

impl GenerationSession {
    pub(super) fn new(
        predictor: Arc<dyn Predictor>,
        prompt: Prompt,
        config: GenerationConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            predictor,
            config,
            cancel,
            prompt,
            step: 0,
            generated: HashSet::new(),
            stop_reason: None,
        }
    }

    /// Run one step: append the top-ranked word and return the snapshot.
    ///
    /// Returns `Ok(None)` once the run has stopped; [`stop_reason`] then says
    /// why. A predictor failure surfaces as an error and leaves the prompt as
    /// of the last successful step, available via [`prompt`].
    ///
    /// [`stop_reason`]: GenerationSession::stop_reason
    /// [`prompt`]: GenerationSession::prompt
    pub fn advance(&mut self) -> Result<Option<Snapshot>, GenerateError> {
        if self.stop_reason.is_some() {
            return Ok(None);
        }
        if self.step >= self.config.max_words {
            self.stop_reason = Some(StopReason::Limit);
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            self.stop_reason = Some(StopReason::Cancelled);
            return Ok(None);
        }

        let candidates = self.predictor.rank(&self.prompt, 1)?;
        let prediction = match candidates.into_iter().next() {
            Some(prediction) => prediction,
            None => {
                self.stop_reason = Some(StopReason::Exhausted);
                return Ok(None);
            }
        };

        // The repeat check only spans words generated in this run, never the
        // user's original prompt.
        if self.config.stop_on_repeat && !self.generated.insert(prediction.token.clone()) {
            self.stop_reason = Some(StopReason::Repeat);
            return Ok(None);
        }

        self.prompt.push(prediction.token.clone());
        self.step += 1;

        Ok(Some(Snapshot {
            step: self.step,
            word: prediction.token,
            prompt: self.prompt.clone(),
        }))
    }

    /// The prompt as of the last successful step.
    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    /// Consume the session, keeping whatever was generated.
    pub fn into_prompt(self) -> Prompt {
        self.prompt
    }

    /// Number of words appended so far.
    pub fn appended(&self) -> usize {
        self.step
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn is_finished(&self) -> bool {
        self.stop_reason.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Generator;
    use crate::predictor::PredictorError;
    use crate::types::Prediction;
    use std::sync::Mutex;

    /// Yields word0, word1, word2, ... so no word ever repeats.
    struct NumberedPredictor {
        next: Mutex<usize>,
    }

    impl NumberedPredictor {
        fn new() -> Self {
            Self {
                next: Mutex::new(0),
            }
        }
    }

    impl Predictor for NumberedPredictor {
        fn rank(&self, _prompt: &Prompt, _top_k: usize) -> Result<Vec<Prediction>, PredictorError> {
            let mut next = self.next.lock().unwrap();
            let word = format!("word{}", *next);
            *next += 1;
            Ok(vec![Prediction::new(word, 1.0)])
        }
    }

    /// Pops from a fixed script, then runs dry.
    struct ScriptedPredictor {
        words: Mutex<Vec<&'static str>>,
    }

    impl ScriptedPredictor {
        fn new(mut words: Vec<&'static str>) -> Self {
            words.reverse();
            Self {
                words: Mutex::new(words),
            }
        }
    }

    impl Predictor for ScriptedPredictor {
        fn rank(&self, _prompt: &Prompt, _top_k: usize) -> Result<Vec<Prediction>, PredictorError> {
            Ok(self
                .words
                .lock()
                .unwrap()
                .pop()
                .map(|word| vec![Prediction::new(word, 0.9)])
                .unwrap_or_default())
        }
    }

    /// Continues "the quick" as "brown", then "fox" forever.
    struct QuickBrownFoxPredictor;

    impl Predictor for QuickBrownFoxPredictor {
        fn rank(&self, prompt: &Prompt, _top_k: usize) -> Result<Vec<Prediction>, PredictorError> {
            let word = match prompt.last() {
                Some("quick") => "brown",
                _ => "fox",
            };
            Ok(vec![Prediction::new(word, 0.8)])
        }
    }

    struct FailAfterPredictor {
        remaining: Mutex<usize>,
    }

    impl Predictor for FailAfterPredictor {
        fn rank(&self, _prompt: &Prompt, _top_k: usize) -> Result<Vec<Prediction>, PredictorError> {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining == 0 {
                return Err(PredictorError::unavailable("backend went away"));
            }
            *remaining -= 1;
            Ok(vec![Prediction::new(format!("w{remaining}"), 0.5)])
        }
    }

    fn session_with(
        predictor: impl Predictor + 'static,
        prompt: &str,
        config: GenerationConfig,
    ) -> GenerationSession {
        Generator::new(Arc::new(predictor)).session(
            Prompt::from_text(prompt),
            config,
            CancellationToken::new(),
        )
    }

    fn drain(session: &mut GenerationSession) -> Vec<Snapshot> {
        let mut snapshots = Vec::new();
        while let Some(snapshot) = session.advance().expect("advance succeeds") {
            snapshots.push(snapshot);
        }
        snapshots
    }

    #[test]
    fn test_run_is_bounded_and_each_step_extends_by_one_word() {
        let config = GenerationConfig {
            max_words: 10,
            stop_on_repeat: true,
        };
        let mut session = session_with(NumberedPredictor::new(), "start here", config);

        let snapshots = drain(&mut session);
        assert_eq!(snapshots.len(), 10);
        assert_eq!(session.stop_reason(), Some(StopReason::Limit));

        let mut expected_len = 2;
        for (i, snapshot) in snapshots.iter().enumerate() {
            expected_len += 1;
            assert_eq!(snapshot.step, i + 1);
            assert_eq!(snapshot.prompt.len(), expected_len);
            assert_eq!(snapshot.prompt.last(), Some(snapshot.word.as_str()));
        }
    }

    #[test]
    fn test_zero_word_limit_yields_no_snapshots() {
        let config = GenerationConfig {
            max_words: 0,
            stop_on_repeat: true,
        };
        let mut session = session_with(NumberedPredictor::new(), "start", config);

        assert!(session.advance().expect("advance succeeds").is_none());
        assert_eq!(session.stop_reason(), Some(StopReason::Limit));
        assert_eq!(session.prompt().to_string(), "start");
    }

    #[test]
    fn test_cancellation_stops_the_run_between_steps() {
        let cancel = CancellationToken::new();
        let generator = Generator::new(Arc::new(NumberedPredictor::new()));
        let mut session = generator.session(
            Prompt::from_text("go"),
            GenerationConfig {
                max_words: 10,
                stop_on_repeat: true,
            },
            cancel.clone(),
        );

        session.advance().expect("advance succeeds").expect("step 1");
        session.advance().expect("advance succeeds").expect("step 2");
        cancel.cancel();

        assert!(session.advance().expect("advance succeeds").is_none());
        assert_eq!(session.stop_reason(), Some(StopReason::Cancelled));
        // Words appended before cancellation survive.
        assert_eq!(session.appended(), 2);
        assert_eq!(session.prompt().to_string(), "go word0 word1");
    }

    #[test]
    fn test_exhaustion_mid_run_keeps_earlier_words() {
        let config = GenerationConfig {
            max_words: 10,
            stop_on_repeat: true,
        };
        let mut session = session_with(ScriptedPredictor::new(vec!["alpha", "beta"]), "go", config);

        let snapshots = drain(&mut session);
        assert_eq!(snapshots.len(), 2);
        assert_eq!(session.stop_reason(), Some(StopReason::Exhausted));
        assert_eq!(session.prompt().to_string(), "go alpha beta");
    }

    #[test]
    fn test_repeated_word_stops_the_run() {
        let config = GenerationConfig {
            max_words: 10,
            stop_on_repeat: true,
        };
        let mut session = session_with(QuickBrownFoxPredictor, "the quick", config);

        let snapshots = drain(&mut session);
        let words: Vec<&str> = snapshots.iter().map(|s| s.word.as_str()).collect();
        assert_eq!(words, ["brown", "fox"]);
        assert_eq!(session.stop_reason(), Some(StopReason::Repeat));
        assert_eq!(session.prompt().to_string(), "the quick brown fox");
    }

    #[test]
    fn test_repeat_check_ignores_the_original_prompt() {
        // "fox" is already in the prompt, but was not generated by this run,
        // so the first generated "fox" is appended. The second stops the run.
        let config = GenerationConfig {
            max_words: 10,
            stop_on_repeat: true,
        };
        let mut session = session_with(QuickBrownFoxPredictor, "fox says", config);

        let snapshots = drain(&mut session);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].word, "fox");
        assert_eq!(session.stop_reason(), Some(StopReason::Repeat));
    }

    #[test]
    fn test_repeat_stop_can_be_disabled() {
        let config = GenerationConfig {
            max_words: 5,
            stop_on_repeat: false,
        };
        let mut session = session_with(QuickBrownFoxPredictor, "the quick", config);

        let snapshots = drain(&mut session);
        assert_eq!(snapshots.len(), 5);
        assert_eq!(session.stop_reason(), Some(StopReason::Limit));
        assert_eq!(
            session.prompt().to_string(),
            "the quick brown fox fox fox fox"
        );
    }

    #[test]
    fn test_predictor_failure_preserves_partial_output() {
        let config = GenerationConfig {
            max_words: 10,
            stop_on_repeat: true,
        };
        let predictor = FailAfterPredictor {
            remaining: Mutex::new(2),
        };
        let mut session = session_with(predictor, "go", config);

        session.advance().expect("advance succeeds").expect("step 1");
        session.advance().expect("advance succeeds").expect("step 2");
        let result = session.advance();

        assert!(matches!(result, Err(GenerateError::Predictor(_))));
        assert_eq!(session.appended(), 2);
        assert_eq!(session.prompt().to_string(), "go w1 w0");
    }

    #[test]
    fn test_advance_after_stop_keeps_returning_none() {
        let config = GenerationConfig {
            max_words: 1,
            stop_on_repeat: true,
        };
        let mut session = session_with(NumberedPredictor::new(), "go", config);

        drain(&mut session);
        assert!(session.advance().expect("advance succeeds").is_none());
        assert!(session.advance().expect("advance succeeds").is_none());
        assert_eq!(session.stop_reason(), Some(StopReason::Limit));
    }
}
