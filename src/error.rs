//! Error types for the Daehwaro assistant

use thiserror::Error;

/// Result type alias for Daehwaro operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Daehwaro assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Language model error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Language model usage quota exhausted
    #[error("LLM quota exhausted: {0}")]
    LlmQuota(String),

    /// Tool execution error
    #[error("tool error: {0}")]
    Tool(String),

    /// Transit API error
    #[error("transit API error: {0}")]
    Transit(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
