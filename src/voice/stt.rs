//! Streaming speech-to-text (STT) recognition
//!
//! A [`RecognitionSession`] binds one queue of captured audio to one live
//! recognition exchange and always resolves to exactly one [`Transcript`].
//! Failures never escape as errors: each maps to a sentinel the pipeline can
//! speak an apology for. The wire protocol lives behind the
//! [`RecognitionBackend`] seam; production uses the Deepgram live WebSocket
//! API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::voice::queue::{BatchRead, FrameQueue};
use crate::{Error, Result};

/// Grace period for the backend to wind down after its event stream ends
const EXCHANGE_GRACE: Duration = Duration::from_secs(1);

/// Result of one listen operation: recognized speech or a failure sentinel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    /// Genuine recognized speech
    Text(String),
    /// No final result before the session deadline (silence counts)
    Timeout,
    /// Recognition service transport/protocol failure
    TransportError,
    /// Audio device could not be acquired
    DeviceError,
}

impl Transcript {
    /// The recognized text, if this is genuine speech
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// User-facing phrase for a failure sentinel, `None` for genuine speech
    #[must_use]
    pub const fn failure_phrase(&self) -> Option<&'static str> {
        match self {
            Self::Text(_) => None,
            Self::Timeout => Some("인식 실패 (침묵 또는 시간 초과)"),
            Self::TransportError => Some("STT 통신 오류"),
            Self::DeviceError => Some("마이크 오류"),
        }
    }
}

/// Streaming recognition settings
#[derive(Debug, Clone)]
pub struct SttSettings {
    /// Recognition model (e.g. "nova-2")
    pub model: String,
    /// BCP-47 language tag (e.g. "ko")
    pub language: String,
    /// Sample rate of the submitted linear PCM audio
    pub sample_rate: u32,
    /// Hard deadline for the whole exchange, measured from session open
    pub deadline: Duration,
    /// How long one queue poll may block before the consumer re-checks
    pub poll_interval: Duration,
}

/// One recognition service response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Interim hypothesis; not surfaced to callers
    Partial(String),
    /// Final result for the utterance
    Final(String),
    /// The service closed the stream without (further) results
    Closed,
}

/// Transport seam for a live recognition exchange
///
/// `recognize` consumes audio batches from `audio` until the channel closes,
/// emits service responses on `events` in arrival order, and returns when the
/// exchange ends. Dropping the event receiver is a normal way to end the
/// exchange early.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    async fn recognize(
        &self,
        settings: &SttSettings,
        audio: mpsc::Receiver<Vec<i16>>,
        events: mpsc::Sender<RecognitionEvent>,
    ) -> Result<()>;
}

/// Lifecycle manager for one streaming recognition exchange
///
/// Guarantees exactly one transcript per run and that the audio queue is
/// closed on every exit path; the capture device itself is released by the
/// caller's [`CaptureStream`](crate::voice::CaptureStream) guard.
pub struct RecognitionSession {
    backend: Arc<dyn RecognitionBackend>,
    settings: SttSettings,
}

impl RecognitionSession {
    /// Create a session over the given backend
    #[must_use]
    pub fn new(backend: Arc<dyn RecognitionBackend>, settings: SttSettings) -> Self {
        Self { backend, settings }
    }

    /// Run the exchange to completion and resolve the transcript
    ///
    /// Only the first final response is honored; interim results are
    /// discarded. A clean server close without a final result resolves to the
    /// timeout sentinel (indistinguishable from silence for the user), and
    /// any transport fault to the communication-error sentinel.
    pub async fn run(&self, queue: FrameQueue) -> Transcript {
        let (audio_tx, audio_rx) = mpsc::channel::<Vec<i16>>(16);
        let (event_tx, mut event_rx) = mpsc::channel::<RecognitionEvent>(16);

        // Pump: drain the queue in batches on the blocking pool and feed the
        // backend until the queue closes or the backend stops listening.
        let pump_queue = queue.clone();
        let poll = self.settings.poll_interval;
        let pump = tokio::task::spawn_blocking(move || {
            loop {
                match pump_queue.next_batch(poll) {
                    BatchRead::Batch(batch) => {
                        if audio_tx.blocking_send(batch).is_err() {
                            break;
                        }
                    }
                    BatchRead::Pending => {}
                    BatchRead::Closed => break,
                }
            }
        });

        let backend = Arc::clone(&self.backend);
        let settings = self.settings.clone();
        let exchange = tokio::spawn(async move {
            backend.recognize(&settings, audio_rx, event_tx).await
        });

        let outcome = tokio::time::timeout(self.settings.deadline, async {
            while let Some(event) = event_rx.recv().await {
                match event {
                    RecognitionEvent::Partial(text) => {
                        tracing::trace!(interim = %text, "interim result discarded");
                    }
                    RecognitionEvent::Final(text) => return Some(text),
                    RecognitionEvent::Closed => return None,
                }
            }
            None
        })
        .await;

        // Stop audio production regardless of how the exchange ended.
        queue.close();
        drop(event_rx);

        let transcript = match outcome {
            Err(_) => {
                tracing::warn!(deadline = ?self.settings.deadline, "no final result before deadline");
                exchange.abort();
                Transcript::Timeout
            }
            Ok(Some(text)) => {
                exchange.abort();
                if text.trim().is_empty() {
                    Transcript::Timeout
                } else {
                    tracing::info!(transcript = %text, "recognition finalized");
                    Transcript::Text(text)
                }
            }
            Ok(None) => match tokio::time::timeout(EXCHANGE_GRACE, exchange).await {
                Ok(Ok(Ok(()))) => {
                    tracing::debug!("recognition stream closed without final result");
                    Transcript::Timeout
                }
                Ok(Ok(Err(e))) => {
                    tracing::error!(error = %e, "recognition exchange failed");
                    Transcript::TransportError
                }
                Ok(Err(join)) => {
                    tracing::error!(error = %join, "recognition task failed");
                    Transcript::TransportError
                }
                Err(_) => Transcript::TransportError,
            },
        };

        let _ = pump.await;
        transcript
    }
}

/// Response message on the Deepgram live WebSocket
#[derive(serde::Deserialize)]
struct LiveMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    is_final: bool,
    channel: Option<LiveChannel>,
}

#[derive(serde::Deserialize)]
struct LiveChannel {
    alternatives: Vec<LiveAlternative>,
}

#[derive(serde::Deserialize)]
struct LiveAlternative {
    transcript: String,
}

/// Deepgram live transcription backend
pub struct DeepgramLive {
    api_key: String,
}

impl DeepgramLive {
    /// Create a new live transcription backend
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }
        Ok(Self { api_key })
    }

    fn endpoint(settings: &SttSettings) -> String {
        format!(
            "wss://api.deepgram.com/v1/listen?model={}&language={}&encoding=linear16&sample_rate={}&channels=1&punctuate=true&interim_results=false",
            settings.model, settings.language, settings.sample_rate
        )
    }
}

#[async_trait]
impl RecognitionBackend for DeepgramLive {
    async fn recognize(
        &self,
        settings: &SttSettings,
        mut audio: mpsc::Receiver<Vec<i16>>,
        events: mpsc::Sender<RecognitionEvent>,
    ) -> Result<()> {
        let mut request = Self::endpoint(settings)
            .into_client_request()
            .map_err(|e| Error::Stt(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Token {}", self.api_key))
                .map_err(|e| Error::Stt(e.to_string()))?,
        );

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| Error::Stt(format!("connect failed: {e}")))?;
        tracing::debug!(model = %settings.model, language = %settings.language, "live recognition stream open");

        let (mut sink, mut source) = ws.split();

        let writer = tokio::spawn(async move {
            while let Some(batch) = audio.recv().await {
                let mut payload = Vec::with_capacity(batch.len() * 2);
                for sample in batch {
                    payload.extend_from_slice(&sample.to_le_bytes());
                }
                if sink.send(Message::binary(payload)).await.is_err() {
                    return;
                }
            }
            // Audio ended: ask the service to flush and finalize.
            let _ = sink.send(Message::text(r#"{"type":"CloseStream"}"#)).await;
        });

        let mut result = Ok(());
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let Ok(parsed) = serde_json::from_str::<LiveMessage>(&text) else {
                        tracing::debug!("unparseable live message skipped");
                        continue;
                    };
                    if parsed.kind != "Results" {
                        continue;
                    }
                    let transcript = parsed
                        .channel
                        .and_then(|c| c.alternatives.into_iter().next())
                        .map(|a| a.transcript)
                        .unwrap_or_default();
                    let event = if parsed.is_final {
                        RecognitionEvent::Final(transcript)
                    } else {
                        RecognitionEvent::Partial(transcript)
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    let _ = events.send(RecognitionEvent::Closed).await;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    result = Err(Error::Stt(e.to_string()));
                    break;
                }
            }
        }

        writer.abort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_phrases_match_sentinels() {
        assert_eq!(
            Transcript::Timeout.failure_phrase(),
            Some("인식 실패 (침묵 또는 시간 초과)")
        );
        assert_eq!(Transcript::TransportError.failure_phrase(), Some("STT 통신 오류"));
        assert_eq!(Transcript::DeviceError.failure_phrase(), Some("마이크 오류"));
        assert_eq!(Transcript::Text("버스".to_string()).failure_phrase(), None);
    }

    #[test]
    fn transcript_text_only_for_speech() {
        assert_eq!(Transcript::Text("안녕".to_string()).text(), Some("안녕"));
        assert_eq!(Transcript::Timeout.text(), None);
    }

    #[test]
    fn live_message_final_result_parses() {
        let raw = r#"{
            "type": "Results",
            "is_final": true,
            "channel": {"alternatives": [{"transcript": "유성온천역 가는 버스", "confidence": 0.98}]}
        }"#;
        let parsed: LiveMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.kind, "Results");
        assert!(parsed.is_final);
        assert_eq!(
            parsed.channel.unwrap().alternatives[0].transcript,
            "유성온천역 가는 버스"
        );
    }

    #[test]
    fn live_metadata_message_parses_without_channel() {
        let raw = r#"{"type": "Metadata", "request_id": "abc"}"#;
        let parsed: LiveMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.kind, "Metadata");
        assert!(!parsed.is_final);
        assert!(parsed.channel.is_none());
    }

    #[test]
    fn endpoint_carries_audio_parameters() {
        let settings = SttSettings {
            model: "nova-2".to_string(),
            language: "ko".to_string(),
            sample_rate: 16000,
            deadline: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        };
        let url = DeepgramLive::endpoint(&settings);
        assert!(url.starts_with("wss://api.deepgram.com/v1/listen?"));
        assert!(url.contains("language=ko"));
        assert!(url.contains("sample_rate=16000"));
        assert!(url.contains("encoding=linear16"));
    }
}
