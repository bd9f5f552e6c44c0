//! The listen → think → speak pipeline
//!
//! Composes capture, recognition, dialogue, synthesis and playback into the
//! conversational loop. Recognition failures come back as sentinels and are
//! answered with a spoken apology; nothing inside the loop is fatal. The
//! audio-facing collaborators sit behind the [`Listener`] and [`Speaker`]
//! seams so the loop runs without hardware in tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::Result;
use crate::config::Config;
use crate::llm::{DialogueOrchestrator, GeminiClient};
use crate::tools::ToolRegistry;
use crate::transit::{self, TransitClient};
use crate::voice::{
    AudioCapture, AudioPlayback, DeepgramLive, FrameQueue, RecognitionSession, TextToSpeech,
    Transcript,
};

/// Spoken once at startup
pub const GREETING: &str = "안녕하세요! 대전 버스 안내 시스템 대화로입니다.";

/// Spoken before each listen so the user knows the microphone is live
const LISTEN_PROMPT: &str = "질문을 말씀해 주세요.";

/// Spoken when the exit keyword is heard
const FAREWELL: &str = "이용해주셔서 감사합니다.";

/// Pause between turns
const TURN_PAUSE: Duration = Duration::from_millis(500);

/// Pause after a spoken apology before listening again
const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Produces one transcript per listen operation
#[async_trait(?Send)]
pub trait Listener {
    async fn listen(&self) -> Transcript;
}

/// Renders text as audible speech
#[async_trait(?Send)]
pub trait Speaker {
    async fn speak(&self, text: &str);
}

/// Listens through the microphone and a live recognition session
struct VoiceListener {
    capture: AudioCapture,
    session: RecognitionSession,
    queue_capacity: usize,
    speaker: Arc<dyn Speaker>,
}

#[async_trait(?Send)]
impl Listener for VoiceListener {
    /// One listen operation: acquire the device, prompt, recognize, release
    ///
    /// The device is released when the capture guard drops, on every path.
    /// Capture starts before the prompt plays so early speech is not lost,
    /// but the prompt is fully heard before recognition begins consuming.
    async fn listen(&self) -> Transcript {
        let queue = FrameQueue::new(self.queue_capacity);
        let stream = match self.capture.start(queue.clone()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "audio device unavailable");
                return Transcript::DeviceError;
            }
        };

        self.speaker.speak(LISTEN_PROMPT).await;
        tracing::info!("listening");

        let transcript = self.session.run(queue).await;
        let dropped = stream.dropped_frames();
        if dropped > 0 {
            tracing::debug!(dropped, "frames dropped during capture");
        }
        drop(stream);
        transcript
    }
}

/// Speaks through TTS synthesis and the default output device
struct VoiceSpeaker {
    tts: TextToSpeech,
    playback: AudioPlayback,
}

#[async_trait(?Send)]
impl Speaker for VoiceSpeaker {
    /// Synthesize and play text; failures are logged, never propagated
    async fn speak(&self, text: &str) {
        let audio = match self.tts.synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::error!(error = %e, "synthesis failed");
                return;
            }
        };
        if let Err(e) = self.playback.play_mp3(&audio).await {
            tracing::error!(error = %e, "playback failed");
        }
    }
}

/// Owns one end-to-end voice conversation
pub struct Pipeline {
    exit_keyword: String,
    listener: Arc<dyn Listener>,
    speaker: Arc<dyn Speaker>,
    orchestrator: DialogueOrchestrator,
}

impl Pipeline {
    /// Wire up all collaborators from configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is incomplete or the audio devices
    /// cannot be opened
    pub fn new(config: Config) -> Result<Self> {
        config.validate_for_run()?;

        let capture = AudioCapture::new(&config.audio)?;
        let playback = AudioPlayback::new()?;
        let tts = TextToSpeech::new(
            config.tts.api_key.clone(),
            config.tts.language.clone(),
            config.tts.voice.clone(),
            config.tts.prosody_rate,
        )?;
        let speaker: Arc<dyn Speaker> = Arc::new(VoiceSpeaker { tts, playback });

        let backend = Arc::new(DeepgramLive::new(config.stt.api_key.clone())?);
        let session =
            RecognitionSession::new(backend, config.stt.settings(config.audio.sample_rate));
        let listener: Arc<dyn Listener> = Arc::new(VoiceListener {
            capture,
            session,
            queue_capacity: config.audio.queue_capacity,
            speaker: Arc::clone(&speaker),
        });

        let mut registry = ToolRegistry::new();
        let transit_client = Arc::new(TransitClient::new(&config.transit)?);
        transit::register_tools(&mut registry, transit_client);

        let model = Arc::new(GeminiClient::new(
            config.llm.api_key.clone(),
            config.llm.model.clone(),
        )?);
        let orchestrator = DialogueOrchestrator::new(model, registry);

        Ok(Self::from_parts(
            config.exit_keyword,
            listener,
            speaker,
            orchestrator,
        ))
    }

    /// Assemble a pipeline from explicit collaborators
    #[must_use]
    pub fn from_parts(
        exit_keyword: String,
        listener: Arc<dyn Listener>,
        speaker: Arc<dyn Speaker>,
        orchestrator: DialogueOrchestrator,
    ) -> Self {
        Self {
            exit_keyword,
            listener,
            speaker,
            orchestrator,
        }
    }

    /// Run the conversational loop until the exit keyword is heard
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; the signature leaves room for fatal
    /// startup faults surfaced mid-run
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("assistant ready");
        self.speaker.speak(GREETING).await;

        loop {
            let listen_start = Instant::now();
            let transcript = self.listener.listen().await;
            let listen_ms = listen_start.elapsed().as_millis();
            tracing::info!(listen_ms, "listen stage complete");

            if let Some(phrase) = transcript.failure_phrase() {
                tracing::warn!(phrase, "recognition failed");
                self.speaker
                    .speak(&format!("죄송합니다. {phrase}. 다시 시도해주세요."))
                    .await;
                tokio::time::sleep(RETRY_PAUSE).await;
                continue;
            }

            let utterance = transcript.text().unwrap_or_default().to_string();
            tracing::info!(utterance = %utterance, "user utterance");

            if utterance.contains(&self.exit_keyword) {
                self.speaker.speak(FAREWELL).await;
                tracing::info!("exit keyword heard, shutting down");
                return Ok(());
            }

            let think_start = Instant::now();
            let answer = self.orchestrator.run_turn(&utterance).await;
            let think_ms = think_start.elapsed().as_millis();
            tracing::info!(think_ms, answer = %answer, "think stage complete");

            let speak_start = Instant::now();
            self.speaker.speak(&answer).await;
            let speak_ms = speak_start.elapsed().as_millis();
            tracing::info!(
                listen_ms,
                think_ms,
                speak_ms,
                total_ms = listen_ms + think_ms + speak_ms,
                "turn complete"
            );

            tokio::time::sleep(TURN_PAUSE).await;
        }
    }
}
