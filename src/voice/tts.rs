//! Text-to-speech (TTS) synthesis via Google Cloud TTS

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::{Error, Result};

/// Response from the Google Cloud TTS REST API
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    language: String,
    voice: String,
    prosody_rate: u8,
}

impl TextToSpeech {
    /// Create a new TTS instance
    ///
    /// `prosody_rate` is an SSML speaking-rate percentage (100 = normal).
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, language: String, voice: String, prosody_rate: u8) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Google TTS API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            language,
            voice,
            prosody_rate,
        })
    }

    /// Synthesize text to MP3 audio bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let ssml = format!(
            "<speak><prosody rate='{}%'>{}</prosody></speak>",
            self.prosody_rate,
            escape_ssml(text)
        );

        let request = serde_json::json!({
            "input": { "ssml": ssml },
            "voice": { "languageCode": self.language, "name": self.voice },
            "audioConfig": { "audioEncoding": "MP3", "sampleRateHertz": 16000 }
        });

        let response = self
            .client
            .post("https://texttospeech.googleapis.com/v1/text:synthesize")
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "TTS API error");
            return Err(Error::Tts(format!("TTS API error {status}: {body}")));
        }

        let result: SynthesizeResponse = response.json().await?;
        let audio = BASE64
            .decode(result.audio_content)
            .map_err(|e| Error::Tts(format!("invalid audio payload: {e}")))?;

        tracing::debug!(chars = text.chars().count(), bytes = audio.len(), "synthesis complete");
        Ok(audio)
    }
}

/// Escape characters with meaning inside SSML text content
fn escape_ssml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_rejected() {
        let result = TextToSpeech::new(
            String::new(),
            "ko-KR".to_string(),
            "ko-KR-Wavenet-D".to_string(),
            90,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn ssml_special_characters_are_escaped() {
        assert_eq!(escape_ssml("3 < 5 & 5 > 3"), "3 &lt; 5 &amp; 5 &gt; 3");
        assert_eq!(escape_ssml("102번 버스"), "102번 버스");
    }
}
