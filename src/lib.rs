//! Daehwaro - voice-driven bus information assistant for Daejeon
//!
//! Captures spoken questions, transcribes them through a streaming
//! recognition session, reasons over them with a tool-calling language model
//! backed by the city's real-time bus API, and speaks the answer back.
//!
//! # Architecture
//!
//! ```text
//! microphone ──► FrameQueue ──► RecognitionSession ──► transcript
//!                                                          │
//!                             ToolRegistry ◄── DialogueOrchestrator ◄──┘
//!                                  │                  │
//!                             transit API        answer text ──► TTS ──► speaker
//! ```
//!
//! The pipeline is strictly sequential per turn; the only concurrency is the
//! audio callback thread feeding the bounded frame queue.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod tools;
pub mod transit;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use llm::{DialogueOrchestrator, GeminiClient, ModelTransport};
pub use pipeline::{Listener, Pipeline, Speaker};
pub use tools::{ToolDeclaration, ToolRegistry};
pub use transit::TransitClient;
pub use voice::{
    AudioCapture, AudioPlayback, FrameQueue, RecognitionBackend, RecognitionEvent,
    RecognitionSession, SttSettings, TextToSpeech, Transcript,
};
