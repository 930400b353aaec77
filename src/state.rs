use crate::config::Config;
use crate::predictor::Predictor;
use crate::services::template::TemplateEngine;
use crate::services::{GenerationService, MetricsService, SessionManager};
use crate::types::AppError;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    // None when the corpus failed to load; the server runs degraded.
    pub generation: Option<Arc<GenerationService>>,
    pub sessions: Arc<RwLock<SessionManager>>,
    pub templates: Arc<TemplateEngine>,
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    pub fn new(config: Config, predictor: Option<Arc<dyn Predictor>>) -> Result<Self> {
        let metrics = Arc::new(MetricsService::new());
        let generation = predictor.map(|predictor| {
            Arc::new(GenerationService::new(
                predictor,
                config.generation_config(),
                Duration::from_millis(config.stream_delay_ms),
                Arc::clone(&metrics),
            ))
        });
        let templates = Arc::new(TemplateEngine::new()?);

        Ok(Self {
            config: Arc::new(config),
            generation,
            sessions: Arc::new(RwLock::new(SessionManager::new())),
            templates,
            metrics,
        })
    }

    /// The generation service, or the error handlers report when the
    /// predictor never loaded.
    pub fn generation(&self) -> Result<&Arc<GenerationService>, AppError> {
        self.generation.as_ref().ok_or(AppError::PredictorUnavailable)
    }
}
