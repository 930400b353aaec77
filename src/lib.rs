// Core modules
pub mod config;
pub mod generation;
pub mod predictor;
pub mod services;
pub mod state;
pub mod types;
pub mod web;

// Re-exports
pub use generation::{GenerationConfig, Generator};
pub use predictor::{NgramPredictor, Predictor};
pub use services::template::engine::TemplateEngine;
pub use state::AppState;
