//! Voice processing module
//!
//! Microphone capture into a bounded frame queue, streaming recognition
//! sessions over that queue, speech synthesis, and speaker playback.

mod capture;
mod playback;
pub mod queue;
pub mod stt;
mod tts;

pub use capture::{AudioCapture, CaptureStream};
pub use playback::AudioPlayback;
pub use queue::{AudioFrame, BatchRead, DEFAULT_QUEUE_CAPACITY, FrameQueue};
pub use stt::{
    DeepgramLive, RecognitionBackend, RecognitionEvent, RecognitionSession, SttSettings,
    Transcript,
};
pub use tts::TextToSpeech;
