//! Configuration management for the Daehwaro assistant
//!
//! Layered: built-in defaults, then an optional TOML file, then environment
//! variables. API keys normally come from the environment.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;

use crate::voice::{DEFAULT_QUEUE_CAPACITY, SttSettings};
use crate::{Error, Result};

use file::ConfigFile;

/// Daehwaro configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Keyword that ends the conversation
    pub exit_keyword: String,

    /// Audio capture configuration
    pub audio: AudioConfig,

    /// Streaming recognition configuration
    pub stt: SttConfig,

    /// Language model configuration
    pub llm: LlmConfig,

    /// Speech synthesis configuration
    pub tts: TtsConfig,

    /// Transit API configuration
    pub transit: TransitConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Input device name; `None` picks the system default
    pub device: Option<String>,

    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Frame duration in milliseconds
    pub frame_ms: u32,

    /// Frame queue capacity
    pub queue_capacity: usize,
}

impl AudioConfig {
    /// Samples per capture frame
    #[must_use]
    pub const fn frame_samples(&self) -> u32 {
        self.sample_rate * self.frame_ms / 1000
    }
}

/// Streaming recognition configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Deepgram API key
    pub api_key: String,

    /// Recognition model
    pub model: String,

    /// Language tag
    pub language: String,

    /// Session deadline in seconds
    pub deadline_secs: u64,

    /// Queue poll interval in milliseconds
    pub poll_ms: u64,
}

impl SttConfig {
    /// Session settings for the given capture sample rate
    #[must_use]
    pub fn settings(&self, sample_rate: u32) -> SttSettings {
        SttSettings {
            model: self.model.clone(),
            language: self.language.clone(),
            sample_rate,
            deadline: Duration::from_secs(self.deadline_secs),
            poll_interval: Duration::from_millis(self.poll_ms),
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Gemini API key
    pub api_key: String,

    /// Model identifier
    pub model: String,
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Google Cloud TTS API key
    pub api_key: String,

    /// Voice language code
    pub language: String,

    /// Voice name
    pub voice: String,

    /// SSML prosody rate percentage
    pub prosody_rate: u8,
}

/// Transit API configuration
#[derive(Debug, Clone)]
pub struct TransitConfig {
    /// Daejeon BIS service key
    pub api_key: String,

    /// Station-search endpoint URL
    pub search_url: String,

    /// Arrival-info endpoint URL
    pub arrival_url: String,

    /// Fixed origin station id
    pub origin_station_id: String,

    /// Fixed origin station display name
    pub origin_station_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exit_keyword: "종료".to_string(),
            audio: AudioConfig {
                device: None,
                sample_rate: 16000,
                frame_ms: 100,
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
            },
            stt: SttConfig {
                api_key: String::new(),
                model: "nova-2".to_string(),
                language: "ko".to_string(),
                deadline_secs: 10,
                poll_ms: 100,
            },
            llm: LlmConfig {
                api_key: String::new(),
                model: "gemini-2.5-flash".to_string(),
            },
            tts: TtsConfig {
                api_key: String::new(),
                language: "ko-KR".to_string(),
                voice: "ko-KR-Wavenet-D".to_string(),
                prosody_rate: 90,
            },
            transit: TransitConfig {
                api_key: String::new(),
                search_url: String::new(),
                arrival_url: String::new(),
                origin_station_id: "8001378".to_string(),
                origin_station_name: "대전광역시청".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration: defaults ← TOML file ← environment
    ///
    /// With an explicit `path` the file must parse; the default location
    /// (`~/.config/daehwaro/config.toml`) is skipped silently when absent.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is missing or invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let file_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_file_path().filter(|p| p.exists()),
        };

        if let Some(file_path) = file_path {
            let raw = std::fs::read_to_string(&file_path).map_err(|e| {
                Error::Config(format!("cannot read {}: {e}", file_path.display()))
            })?;
            let overlay: ConfigFile = toml::from_str(&raw)?;
            config.apply_file(overlay);
            tracing::debug!(path = %file_path.display(), "config file applied");
        }

        config.apply_env();
        Ok(config)
    }

    /// Default config file location
    #[must_use]
    pub fn default_file_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "daehwaro").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn apply_file(&mut self, overlay: ConfigFile) {
        if let Some(v) = overlay.exit_keyword {
            self.exit_keyword = v;
        }

        if overlay.audio.device.is_some() {
            self.audio.device = overlay.audio.device;
        }
        if let Some(v) = overlay.audio.sample_rate {
            self.audio.sample_rate = v;
        }
        if let Some(v) = overlay.audio.frame_ms {
            self.audio.frame_ms = v;
        }
        if let Some(v) = overlay.audio.queue_capacity {
            self.audio.queue_capacity = v;
        }

        if let Some(v) = overlay.stt.model {
            self.stt.model = v;
        }
        if let Some(v) = overlay.stt.language {
            self.stt.language = v;
        }
        if let Some(v) = overlay.stt.deadline_secs {
            self.stt.deadline_secs = v;
        }
        if let Some(v) = overlay.stt.poll_ms {
            self.stt.poll_ms = v;
        }
        if let Some(v) = overlay.stt.api_key {
            self.stt.api_key = v;
        }

        if let Some(v) = overlay.llm.model {
            self.llm.model = v;
        }
        if let Some(v) = overlay.llm.api_key {
            self.llm.api_key = v;
        }

        if let Some(v) = overlay.tts.language {
            self.tts.language = v;
        }
        if let Some(v) = overlay.tts.voice {
            self.tts.voice = v;
        }
        if let Some(v) = overlay.tts.prosody_rate {
            self.tts.prosody_rate = v;
        }
        if let Some(v) = overlay.tts.api_key {
            self.tts.api_key = v;
        }

        if let Some(v) = overlay.transit.api_key {
            self.transit.api_key = v;
        }
        if let Some(v) = overlay.transit.search_url {
            self.transit.search_url = v;
        }
        if let Some(v) = overlay.transit.arrival_url {
            self.transit.arrival_url = v;
        }
        if let Some(v) = overlay.transit.origin_station_id {
            self.transit.origin_station_id = v;
        }
        if let Some(v) = overlay.transit.origin_station_name {
            self.transit.origin_station_name = v;
        }
    }

    fn apply_env(&mut self) {
        env_override("DEEPGRAM_API_KEY", &mut self.stt.api_key);
        env_override("GEMINI_API_KEY", &mut self.llm.api_key);
        env_override("GOOGLE_TTS_API_KEY", &mut self.tts.api_key);
        env_override("DAEJEON_API_KEY", &mut self.transit.api_key);
        env_override("DAEJEON_SEARCH_URL", &mut self.transit.search_url);
        env_override("DAEJEON_ARRIVAL_URL", &mut self.transit.arrival_url);
        if let Ok(device) = std::env::var("DAEHWARO_MIC_DEVICE") {
            self.audio.device = Some(device);
        }
    }

    /// Check everything the full pipeline needs is present
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the missing settings
    pub fn validate_for_run(&self) -> Result<()> {
        let mut missing = Vec::new();
        // An empty keyword would match every utterance and end the session
        // on the first turn.
        if self.exit_keyword.is_empty() {
            missing.push("exit_keyword");
        }
        if self.stt.api_key.is_empty() {
            missing.push("stt.api_key (DEEPGRAM_API_KEY)");
        }
        if self.llm.api_key.is_empty() {
            missing.push("llm.api_key (GEMINI_API_KEY)");
        }
        if self.tts.api_key.is_empty() {
            missing.push("tts.api_key (GOOGLE_TTS_API_KEY)");
        }
        if self.transit.api_key.is_empty() {
            missing.push("transit.api_key (DAEJEON_API_KEY)");
        }
        if self.transit.search_url.is_empty() {
            missing.push("transit.search_url (DAEJEON_SEARCH_URL)");
        }
        if self.transit.arrival_url.is_empty() {
            missing.push("transit.arrival_url (DAEJEON_ARRIVAL_URL)");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("missing settings: {}", missing.join(", "))))
        }
    }
}

fn env_override(name: &str, slot: &mut String) {
    if let Ok(value) = std::env::var(name)
        && !value.is_empty()
    {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.exit_keyword, "종료");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.frame_samples(), 1600);
        assert_eq!(config.stt.deadline_secs, 10);
        assert_eq!(config.transit.origin_station_id, "8001378");
        assert_eq!(config.transit.origin_station_name, "대전광역시청");
    }

    #[test]
    fn file_overlay_is_partial() {
        let overlay: ConfigFile = toml::from_str(
            r#"
            exit_keyword = "그만"

            [audio]
            sample_rate = 44100

            [stt]
            deadline_secs = 7
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(overlay);

        assert_eq!(config.exit_keyword, "그만");
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.stt.deadline_secs, 7);
        // Untouched fields keep their defaults
        assert_eq!(config.audio.frame_ms, 100);
        assert_eq!(config.stt.model, "nova-2");
    }

    #[test]
    fn validation_names_missing_settings() {
        let config = Config::default();
        let err = config.validate_for_run().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("GEMINI_API_KEY"));
        assert!(message.contains("DEEPGRAM_API_KEY"));
    }

    #[test]
    fn empty_exit_keyword_fails_validation() {
        let mut config = Config::default();
        config.stt.api_key = "dg".to_string();
        config.llm.api_key = "gm".to_string();
        config.tts.api_key = "tts".to_string();
        config.transit.api_key = "bis".to_string();
        config.transit.search_url = "http://example.invalid/search".to_string();
        config.transit.arrival_url = "http://example.invalid/arrival".to_string();

        config.exit_keyword = String::new();
        let err = config.validate_for_run().unwrap_err();
        assert!(err.to_string().contains("exit_keyword"));

        config.exit_keyword = "종료".to_string();
        assert!(config.validate_for_run().is_ok());
    }

    #[test]
    fn stt_settings_carry_durations() {
        let config = Config::default();
        let settings = config.stt.settings(16000);
        assert_eq!(settings.deadline, Duration::from_secs(10));
        assert_eq!(settings.poll_interval, Duration::from_millis(100));
        assert_eq!(settings.sample_rate, 16000);
    }
}
