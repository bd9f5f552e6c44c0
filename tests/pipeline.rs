//! Conversational loop integration tests
//!
//! Runs the pipeline loop against scripted listeners, speakers and a scripted
//! model transport; no audio hardware or network access required.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use daehwaro::llm::{Content, DialogueOrchestrator, GenerateRequest, ModelTransport, Part};
use daehwaro::pipeline::{GREETING, Listener, Pipeline, Speaker};
use daehwaro::tools::ToolRegistry;
use daehwaro::voice::Transcript;
use daehwaro::{Error, Result};

/// Listener replaying scripted transcripts; speaks the exit keyword when the
/// script runs out so a looping regression cannot hang the test
struct ScriptedListener {
    transcripts: Mutex<VecDeque<Transcript>>,
    calls: AtomicUsize,
}

impl ScriptedListener {
    fn new(transcripts: Vec<Transcript>) -> Arc<Self> {
        Arc::new(Self {
            transcripts: Mutex::new(transcripts.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait(?Send)]
impl Listener for ScriptedListener {
    async fn listen(&self) -> Transcript {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transcripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Transcript::Text("종료".to_string()))
    }
}

/// Speaker recording everything it is asked to say
#[derive(Default)]
struct ScriptedSpeaker {
    spoken: Mutex<Vec<String>>,
}

impl ScriptedSpeaker {
    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait(?Send)]
impl Speaker for ScriptedSpeaker {
    async fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}

/// Transport replaying scripted replies and counting requests
struct ScriptedModel {
    replies: Mutex<VecDeque<Content>>,
    requests: AtomicUsize,
}

impl ScriptedModel {
    fn new(replies: Vec<Content>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: AtomicUsize::new(0),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelTransport for ScriptedModel {
    async fn generate(&self, _request: &GenerateRequest) -> Result<Content> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Llm("script exhausted".to_string()))
    }
}

fn model_text(text: &str) -> Content {
    Content {
        role: "model".to_string(),
        parts: vec![Part {
            text: Some(text.to_string()),
            ..Part::default()
        }],
    }
}

fn pipeline(
    listener: Arc<ScriptedListener>,
    speaker: Arc<ScriptedSpeaker>,
    model: Arc<ScriptedModel>,
) -> Pipeline {
    Pipeline::from_parts(
        "종료".to_string(),
        listener,
        speaker,
        DialogueOrchestrator::new(model, ToolRegistry::new()),
    )
}

#[tokio::test]
async fn exit_keyword_ends_the_session_without_a_turn() {
    let listener = ScriptedListener::new(vec![Transcript::Text("이제 종료해줘".to_string())]);
    let speaker = Arc::new(ScriptedSpeaker::default());
    let model = ScriptedModel::new(Vec::new());

    let mut pipeline = pipeline(Arc::clone(&listener), Arc::clone(&speaker), Arc::clone(&model));
    pipeline.run().await.unwrap();

    // The loop never listened again and the model was never consulted
    assert_eq!(listener.calls(), 1);
    assert_eq!(model.request_count(), 0);

    let spoken = speaker.spoken();
    assert_eq!(spoken.first().map(String::as_str), Some(GREETING));
    assert_eq!(
        spoken.last().map(String::as_str),
        Some("이용해주셔서 감사합니다.")
    );
}

#[tokio::test]
async fn failure_sentinel_gets_an_apology_and_skips_the_model() {
    let listener = ScriptedListener::new(vec![
        Transcript::Timeout,
        Transcript::Text("종료".to_string()),
    ]);
    let speaker = Arc::new(ScriptedSpeaker::default());
    let model = ScriptedModel::new(Vec::new());

    let mut pipeline = pipeline(Arc::clone(&listener), Arc::clone(&speaker), Arc::clone(&model));
    pipeline.run().await.unwrap();

    // The sentinel was apologized for and the loop kept going
    assert_eq!(model.request_count(), 0);
    assert_eq!(listener.calls(), 2);
    assert!(speaker.spoken().iter().any(
        |s| s == "죄송합니다. 인식 실패 (침묵 또는 시간 초과). 다시 시도해주세요."
    ));
}

#[tokio::test]
async fn recognized_utterance_runs_a_turn_and_speaks_the_answer() {
    let listener = ScriptedListener::new(vec![
        Transcript::Text("유성온천역 가는 버스 알려줘".to_string()),
        Transcript::Text("종료".to_string()),
    ]);
    let speaker = Arc::new(ScriptedSpeaker::default());
    let model = ScriptedModel::new(vec![model_text("102번 버스를 타세요.")]);

    let mut pipeline = pipeline(Arc::clone(&listener), Arc::clone(&speaker), Arc::clone(&model));
    pipeline.run().await.unwrap();

    assert_eq!(model.request_count(), 1);
    assert!(speaker.spoken().iter().any(|s| s == "102번 버스를 타세요."));
}
