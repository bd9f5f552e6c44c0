//! TOML configuration file loading
//!
//! Supports `~/.config/daehwaro/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Keyword that ends the conversation (e.g. "종료")
    pub exit_keyword: Option<String>,

    /// Audio capture configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Streaming recognition configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Transit API configuration
    #[serde(default)]
    pub transit: TransitFileConfig,
}

/// Audio capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Input device name; omit for the system default
    pub device: Option<String>,

    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Frame duration in milliseconds
    pub frame_ms: Option<u32>,

    /// Frame queue capacity
    pub queue_capacity: Option<usize>,
}

/// Streaming recognition configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Recognition model (e.g. "nova-2")
    pub model: Option<String>,

    /// Language tag (e.g. "ko")
    pub language: Option<String>,

    /// Session deadline in seconds
    pub deadline_secs: Option<u64>,

    /// Queue poll interval in milliseconds
    pub poll_ms: Option<u64>,

    /// Deepgram API key
    pub api_key: Option<String>,
}

/// Language model configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gemini-2.5-flash")
    pub model: Option<String>,

    /// Gemini API key
    pub api_key: Option<String>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Voice language code (e.g. "ko-KR")
    pub language: Option<String>,

    /// Voice name (e.g. "ko-KR-Wavenet-D")
    pub voice: Option<String>,

    /// SSML prosody rate percentage (100 = normal speed)
    pub prosody_rate: Option<u8>,

    /// Google Cloud TTS API key
    pub api_key: Option<String>,
}

/// Transit API configuration
#[derive(Debug, Default, Deserialize)]
pub struct TransitFileConfig {
    /// Daejeon BIS service key
    pub api_key: Option<String>,

    /// Station-search endpoint URL
    pub search_url: Option<String>,

    /// Arrival-info endpoint URL
    pub arrival_url: Option<String>,

    /// Fixed origin station id
    pub origin_station_id: Option<String>,

    /// Fixed origin station display name
    pub origin_station_name: Option<String>,
}
