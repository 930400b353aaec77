use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nextword_bot::config::Config;
use nextword_bot::predictor::{corpus, NgramPredictor, Predictor};
use nextword_bot::state::AppState;
use nextword_bot::web;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nextword_bot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting NextWord Bot");

    // Load configuration
    let config = Config::from_env()?;

    // Build the predictor from the corpus, but don't fail if it is missing:
    // the server still starts and the API reports the predictor as unavailable.
    let predictor: Option<Arc<dyn Predictor>> =
        match corpus::load_corpus(Path::new(&config.corpus_path)) {
            Ok(text) => {
                let predictor = NgramPredictor::from_corpus_text(&text);
                tracing::info!(
                    "✅ Corpus loaded: {} distinct words",
                    predictor.vocabulary_size()
                );
                Some(Arc::new(predictor))
            }
            Err(e) => {
                tracing::error!("⚠️ Corpus loading failed: {}", e);
                tracing::info!("🌐 Server will start without a predictor");
                None
            }
        };

    // Create application state
    let state = AppState::new(config, predictor)?;

    // Start web server
    web::start_server(state).await
}
