use crate::generation::GenerationConfig;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub host: String,
    pub port: u16,

    // Predictor configuration
    pub corpus_path: String,

    // Generation defaults
    pub max_words: usize,
    pub top_k: usize,
    pub stop_on_repeat: bool,

    // Streaming
    pub stream_delay_ms: u64,

    // Sessions
    pub max_sessions: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,

            corpus_path: env::var("CORPUS_PATH")
                .unwrap_or_else(|_| "data/corpus.txt".to_string()),

            max_words: env::var("MAX_WORDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            top_k: env::var("TOP_K")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            stop_on_repeat: env::var("STOP_ON_REPEAT")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,

            stream_delay_ms: env::var("STREAM_DELAY_MS")
                .unwrap_or_else(|_| "200".to_string())
                .parse()?,

            max_sessions: env::var("MAX_SESSIONS")
                .unwrap_or_else(|_| "64".to_string())
                .parse()?,
        })
    }

    /// Default per-run generation settings derived from the server config.
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_words: self.max_words,
            stop_on_repeat: self.stop_on_repeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() -> anyhow::Result<()> {
        let config = Config::from_env()?;
        assert_eq!(config.max_words, 10);
        assert_eq!(config.top_k, 5);
        assert!(config.stop_on_repeat);
        assert_eq!(config.stream_delay_ms, 200);
        Ok(())
    }
}
