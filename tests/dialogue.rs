//! Dialogue orchestration integration tests
//!
//! Drives full conversational turns against a scripted model transport and
//! in-memory tool handlers; no network access required.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use daehwaro::llm::{
    Content, DialogueOrchestrator, FunctionCall, GenerateRequest, MAX_TOOL_ROUNDS, ModelTransport,
    NO_ANSWER, PROCESSING_ERROR, Part, QUOTA_EXCEEDED,
};
use daehwaro::tools::{ToolDeclaration, ToolRegistry};
use daehwaro::{Error, Result};

/// Transport that replays a scripted sequence of replies and records requests
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Content>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<Content>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> GenerateRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ModelTransport for ScriptedModel {
    async fn generate(&self, request: &GenerateRequest) -> Result<Content> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Llm("script exhausted".to_string())))
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

fn model_call(name: &str, args: Value) -> Content {
    Content {
        role: "model".to_string(),
        parts: vec![Part {
            function_call: Some(FunctionCall {
                name: name.to_string(),
                args,
            }),
            ..Part::default()
        }],
    }
}

fn bus_finder_declaration() -> ToolDeclaration {
    ToolDeclaration {
        name: "find_direct_bus_from_city_hall".to_string(),
        description: "시청 출발 버스 검색".to_string(),
        parameters: json!({
            "type": "OBJECT",
            "properties": { "destination_name": { "type": "STRING" } },
            "required": ["destination_name"]
        }),
    }
}

/// Registry with one counting bus-finder tool returning `result`
fn registry_with_bus_finder(result: Value, invocations: Arc<AtomicUsize>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(
        bus_finder_declaration(),
        Arc::new(move |_args| {
            let result = result.clone();
            let invocations = Arc::clone(&invocations);
            Box::pin(async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(result)
            })
        }),
    );
    registry
}

#[tokio::test]
async fn tool_call_turn_answers_from_second_exchange() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let registry = registry_with_bus_finder(
        json!({
            "start_station": "대전광역시청",
            "destination_request": "유성온천역",
            "matching_buses": [
                { "bus_no": "102", "arrival_min": 5, "destination": "유성온천역네거리", "status_pos": 3 }
            ]
        }),
        Arc::clone(&invocations),
    );

    let model = ScriptedModel::new(vec![
        Ok(model_call(
            "find_direct_bus_from_city_hall",
            json!({ "destination_name": "유성온천역" }),
        )),
        Ok(model_text("102번 버스를 타시면 5분 후에 도착합니다.")),
    ]);

    let mut orchestrator = DialogueOrchestrator::new(model.clone(), registry);
    let answer = orchestrator
        .run_turn("대전광역시청에서 유성온천역 가는 버스 알려줘")
        .await;

    // The answer comes from the second exchange, not the first
    assert!(answer.contains("102"));
    assert!(answer.contains("5분"));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(model.request_count(), 2);

    // The second request carried the tool result keyed by tool name
    let followup = model.request(1);
    let response_part = followup
        .contents
        .last()
        .and_then(|c| c.parts.first())
        .and_then(|p| p.function_response.as_ref())
        .expect("function response appended to history");
    assert_eq!(response_part.name, "find_direct_bus_from_city_hall");
    assert_eq!(response_part.response["matching_buses"][0]["bus_no"], "102");
}

#[tokio::test]
async fn empty_tool_result_still_produces_an_answer() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let registry = registry_with_bus_finder(
        json!({
            "start_station": "대전광역시청",
            "destination_request": "유성온천역",
            "matching_buses": []
        }),
        Arc::clone(&invocations),
    );

    let model = ScriptedModel::new(vec![
        Ok(model_call(
            "find_direct_bus_from_city_hall",
            json!({ "destination_name": "유성온천역" }),
        )),
        // The model falls back to its own route suggestion
        Ok(model_text(
            "지하철 1호선을 이용해 유성온천역으로 가시는 것을 추천드립니다.",
        )),
    ]);

    let mut orchestrator = DialogueOrchestrator::new(model.clone(), registry);
    let answer = orchestrator.run_turn("유성온천역 가는 버스 알려줘").await;

    assert!(!answer.is_empty());
    assert_ne!(answer, NO_ANSWER);
    assert_ne!(answer, PROCESSING_ERROR);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_tool_is_reported_to_the_model_as_data() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let registry = registry_with_bus_finder(json!({}), Arc::clone(&invocations));

    let model = ScriptedModel::new(vec![
        Ok(model_call("warp_drive", json!({ "speed": 9 }))),
        Ok(model_text("죄송합니다, 해당 기능은 지원하지 않습니다.")),
    ]);

    let mut orchestrator = DialogueOrchestrator::new(model.clone(), registry);
    let answer = orchestrator.run_turn("워프 해줘").await;

    // No handler ran, nothing escaped, and the error went back as data
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert!(!answer.is_empty());
    let followup = model.request(1);
    let response = followup
        .contents
        .last()
        .and_then(|c| c.parts.first())
        .and_then(|p| p.function_response.as_ref())
        .expect("error payload appended");
    assert!(
        response.response["error"]
            .as_str()
            .unwrap()
            .contains("알 수 없는 함수")
    );
}

#[tokio::test]
async fn direct_text_reply_skips_tools() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let registry = registry_with_bus_finder(json!({}), Arc::clone(&invocations));

    let model = ScriptedModel::new(vec![Ok(model_text("안녕하세요, 무엇을 도와드릴까요?"))]);

    let mut orchestrator = DialogueOrchestrator::new(model.clone(), registry);
    let answer = orchestrator.run_turn("안녕").await;

    assert_eq!(answer, "안녕하세요, 무엇을 도와드릴까요?");
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert_eq!(model.request_count(), 1);
}

#[tokio::test]
async fn quota_exhaustion_resolves_to_fixed_apology() {
    let model = ScriptedModel::new(vec![Err(Error::LlmQuota("per-day limit".to_string()))]);
    let mut orchestrator = DialogueOrchestrator::new(model, ToolRegistry::new());

    let answer = orchestrator.run_turn("버스 알려줘").await;
    assert_eq!(answer, QUOTA_EXCEEDED);
}

#[tokio::test]
async fn transport_fault_resolves_to_processing_error() {
    let model = ScriptedModel::new(vec![Err(Error::Llm("connection reset".to_string()))]);
    let mut orchestrator = DialogueOrchestrator::new(model, ToolRegistry::new());

    let answer = orchestrator.run_turn("버스 알려줘").await;
    assert_eq!(answer, PROCESSING_ERROR);
}

#[tokio::test]
async fn reply_without_text_or_tool_call_falls_back() {
    let model = ScriptedModel::new(vec![Ok(Content {
        role: "model".to_string(),
        parts: Vec::new(),
    })]);
    let mut orchestrator = DialogueOrchestrator::new(model, ToolRegistry::new());

    let answer = orchestrator.run_turn("버스 알려줘").await;
    assert_eq!(answer, NO_ANSWER);
}

#[tokio::test]
async fn endless_tool_requests_hit_the_round_cap() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let registry = registry_with_bus_finder(json!({ "matching_buses": [] }), Arc::clone(&invocations));

    let replies: Vec<Result<Content>> = (0..=MAX_TOOL_ROUNDS)
        .map(|_| {
            Ok(model_call(
                "find_direct_bus_from_city_hall",
                json!({ "destination_name": "유성온천역" }),
            ))
        })
        .collect();
    let model = ScriptedModel::new(replies);

    let mut orchestrator = DialogueOrchestrator::new(model.clone(), registry);
    let answer = orchestrator.run_turn("버스 알려줘").await;

    assert_eq!(answer, NO_ANSWER);
    assert_eq!(invocations.load(Ordering::SeqCst), MAX_TOOL_ROUNDS);
    assert_eq!(model.request_count(), MAX_TOOL_ROUNDS + 1);
}

#[tokio::test]
async fn history_is_append_only_across_turns() {
    let model = ScriptedModel::new(vec![
        Ok(model_text("첫 번째 답변입니다.")),
        Ok(model_text("두 번째 답변입니다.")),
    ]);
    let mut orchestrator = DialogueOrchestrator::new(model.clone(), ToolRegistry::new());
    orchestrator.set_system_instruction("당신은 테스트 챗봇입니다.");

    orchestrator.run_turn("첫 질문").await;
    orchestrator.run_turn("둘째 질문").await;

    // user, model, user, model
    let roles: Vec<&str> = orchestrator.history().iter().map(|c| c.role.as_str()).collect();
    assert_eq!(roles, ["user", "model", "user", "model"]);

    // The second request saw the whole history and the custom instruction
    let second = model.request(1);
    assert_eq!(second.contents.len(), 3);
    let wire = serde_json::to_value(&second).unwrap();
    assert_eq!(
        wire["systemInstruction"]["parts"][0]["text"],
        "당신은 테스트 챗봇입니다."
    );
}
