//! Drives prediction and auto-generation against the loaded predictor
//!
//! The generation core is synchronous and pull-based; this service is where
//! runs meet the async world. It paces snapshot delivery so browsers can
//! follow along, and it translates run outcomes into stream events.

use crate::generation::{AppendOutcome, GenerateError, GenerationConfig, Generator, StopReason};
use crate::predictor::Predictor;
use crate::services::MetricsService;
use crate::types::{Prediction, Prompt, StreamEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct GenerationService {
    generator: Generator,
    generation: GenerationConfig,
    stream_delay: Duration,
    metrics: Arc<MetricsService>,
}

impl GenerationService {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        generation: GenerationConfig,
        stream_delay: Duration,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            generator: Generator::new(predictor),
            generation,
            stream_delay,
            metrics,
        }
    }

    /// Rank next-word candidates for a prompt.
    pub fn predict(
        &self,
        prompt: &Prompt,
        top_k: usize,
    ) -> Result<Vec<Prediction>, GenerateError> {
        let started = Instant::now();
        let ranked = self.generator.rank(prompt, top_k)?;
        self.metrics
            .record_rank(started.elapsed().as_micros() as u64);
        Ok(ranked)
    }

    /// Append the single top-ranked word to the prompt.
    pub fn append(&self, prompt: Prompt) -> Result<AppendOutcome, GenerateError> {
        self.generator.append_next(prompt)
    }

    /// Run auto-generation to completion, sending one event per step.
    ///
    /// Always returns the final prompt, including the partial output of a
    /// run that was cancelled or hit a predictor failure, so the caller can
    /// write it back to the session.
    pub async fn run(
        &self,
        prompt: Prompt,
        cancel: CancellationToken,
        events: mpsc::Sender<StreamEvent>,
    ) -> Prompt {
        let mut session = self.generator.session(prompt, self.generation, cancel);

        loop {
            match session.advance() {
                Ok(Some(snapshot)) => {
                    let event = StreamEvent::snapshot(
                        snapshot.step,
                        snapshot.word,
                        snapshot.prompt.to_string(),
                    );
                    if events.send(event).await.is_err() {
                        tracing::debug!("event channel closed, abandoning run");
                        break;
                    }
                    tokio::time::sleep(self.stream_delay).await;
                }
                Ok(None) => {
                    let reason = session
                        .stop_reason()
                        .map(|r| r.as_str())
                        .unwrap_or(StopReason::Limit.as_str());
                    tracing::info!(
                        "🏁 run stopped after {} words ({})",
                        session.appended(),
                        reason
                    );
                    self.metrics.record_run();
                    let _ = events
                        .send(StreamEvent::complete(
                            reason.to_string(),
                            session.prompt().to_string(),
                        ))
                        .await;
                    break;
                }
                Err(e) => {
                    tracing::error!("run failed after {} words: {}", session.appended(), e);
                    let _ = events.send(StreamEvent::error(e.to_string())).await;
                    break;
                }
            }
        }

        self.metrics.record_words(session.appended());
        session.into_prompt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::PredictorError;
    use std::sync::Mutex;

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

    struct FailingPredictor;

    impl Predictor for FailingPredictor {
        fn rank(&self, _prompt: &Prompt, _top_k: usize) -> Result<Vec<Prediction>, PredictorError> {
            Err(PredictorError::unavailable("backend went away"))
        }
    }

    fn service(predictor: impl Predictor + 'static) -> GenerationService {
        GenerationService::new(
            Arc::new(predictor),
            GenerationConfig {
                max_words: 10,
                stop_on_repeat: true,
            },
            Duration::ZERO,
            Arc::new(MetricsService::new()),
        )
    }

    async fn drain(receiver: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_run_streams_snapshots_then_complete() {
        let service = service(ScriptedPredictor::new(vec!["brown", "fox"]));
        let (sender, mut receiver) = mpsc::channel(100);

        let prompt = service
            .run(
                Prompt::from_text("the quick"),
                CancellationToken::new(),
                sender,
            )
            .await;
        assert_eq!(prompt.to_string(), "the quick brown fox");

        let events = drain(&mut receiver).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            StreamEvent::Snapshot { step: 1, word, .. } if word == "brown"
        ));
        assert!(matches!(
            &events[2],
            StreamEvent::Complete { reason, text }
                if reason == "exhausted" && text == "the quick brown fox"
        ));
    }

    #[tokio::test]
    async fn test_cancelled_run_completes_immediately() {
        let service = service(ScriptedPredictor::new(vec!["brown", "fox"]));
        let (sender, mut receiver) = mpsc::channel(100);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let prompt = service
            .run(Prompt::from_text("the quick"), cancel, sender)
            .await;
        assert_eq!(prompt.to_string(), "the quick");

        let events = drain(&mut receiver).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::Complete { reason, .. } if reason == "cancelled"
        ));
    }

    #[tokio::test]
    async fn test_predictor_failure_emits_error_event() {
        let service = service(FailingPredictor);
        let (sender, mut receiver) = mpsc::channel(100);

        let prompt = service
            .run(Prompt::from_text("go"), CancellationToken::new(), sender)
            .await;
        assert_eq!(prompt.to_string(), "go");

        let events = drain(&mut receiver).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_predict_records_metrics() {
        let metrics = Arc::new(MetricsService::new());
        let service = GenerationService::new(
            Arc::new(ScriptedPredictor::new(vec!["brown"])),
            GenerationConfig::default(),
            Duration::ZERO,
            Arc::clone(&metrics),
        );

        service
            .predict(&Prompt::from_text("the quick"), 5)
            .expect("predict succeeds");
        assert_eq!(metrics.get_stats().rank_requests, 1);
    }
}
