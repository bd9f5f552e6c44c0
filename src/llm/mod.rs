//! Language model integration and dialogue orchestration
//!
//! The orchestrator owns the append-only conversation history and drives one
//! turn at a time: send the user's utterance, execute any tool call the model
//! requests, feed the result back as data, and extract the final text. Model
//! failures never escape a turn; they resolve to fixed user-facing messages
//! so the pipeline keeps looping.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{ToolDeclaration, ToolRegistry};
use crate::{Error, Result};

/// Upper bound on tool-call rounds within a single turn
pub const MAX_TOOL_ROUNDS: usize = 4;

/// Fallback when the model produced neither a tool call nor text
pub const NO_ANSWER: &str = "응답을 생성하지 못했습니다.";

/// Fixed apology when the model quota is exhausted
pub const QUOTA_EXCEEDED: &str = "API 사용량 한도를 초과했습니다. 잠시 후 다시 시도해주세요.";

/// Fixed message for any other model-communication fault
pub const PROCESSING_ERROR: &str = "응답 처리 중 문제가 발생했습니다.";

/// System instruction for the bus-information assistant
pub const SYSTEM_INSTRUCTION: &str = "\
당신은 대전시의 버스 도착 정보 및 최적 경로를 안내하는 전문 챗봇입니다.
사용자의 질문에 대해 친절하고 간결한 한국어 텍스트로만 응답해야 하며 질문의 대한 대답은 존댓말을 사용해야 합니다.
출발지는 대전광역시청입니다.

1. 정보 제공 원칙:
    - 외부 함수 호출을 통해 받은 실시간 데이터를 최우선으로 하여 답변을 생성해야 합니다.
    - 가장 빠르거나 합리적인 경로 1가지를 즉시 제안하며, 필요한 핵심 정보만 포함하여 2문장을 넘기지 않게 간결하고 정확하게 답변합니다.
    - \"몇 번 버스를 타야하며, 이 버스는 몇 분후에 도착한다, 몇 정거장 전에 있다.\" 와 같은 문장으로 정보를 알려주세요.
2. 서식 및 출력 제한:
    - 절대로 이모티콘, 마크다운 표, 굵은 글씨, 목록(예: *, #, - 등) 또는 기타 서식 요소를 사용하지 마세요.
    - 오직 음성 합성으로 읽힐 수 있는 순수한 텍스트 문자열만 반환해야 합니다.

3. 데이터 부재 시 처리:
    - 함수로 정보를 찾을 수 없는 경우 (예: matching_buses: [] 또는 error가 반환된 경우), 당신의 최신 지식을 기반으로 가장 합리적인 환승 경로 1가지를 (마치 조회된 것처럼) 자신 있게 제안합니다.
";

/// One content part: text, a model-requested tool call, or a tool result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// A tool result fed back to the model, keyed by tool name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

/// One message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A user utterance
    #[must_use]
    pub fn user_text(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part {
                text: Some(text.to_string()),
                ..Part::default()
            }],
        }
    }

    /// A tool result, sent back as a user-role function response
    #[must_use]
    pub fn function_response(name: &str, response: Value) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part {
                function_response: Some(FunctionResponse {
                    name: name.to_string(),
                    response,
                }),
                ..Part::default()
            }],
        }
    }
}

/// System instruction wrapper
#[derive(Debug, Clone, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

/// Tool declarations announced to the model
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    pub function_declarations: Vec<ToolDeclaration>,
}

/// One model request: instruction, full history, callable tools
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub system_instruction: SystemInstruction,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSet>,
}

/// Transport seam to the language model
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Produce the model's reply content for one request
    async fn generate(&self, request: &GenerateRequest) -> Result<Content>;
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiError,
}

#[derive(Deserialize, Default)]
struct ApiError {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

/// Gemini `generateContent` REST client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Gemini API key required".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl ModelTransport for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<Content> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
            tracing::error!(status = %status, api_status = %parsed.error.status, "model request failed");
            if status.as_u16() == 429 || parsed.error.status == "RESOURCE_EXHAUSTED" {
                return Err(Error::LlmQuota(parsed.error.message));
            }
            return Err(Error::Llm(format!("model API error {status}: {body}")));
        }

        let result: GenerateResponse = response.json().await?;
        result
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content)
            .ok_or_else(|| Error::Llm("no candidates in model response".to_string()))
    }
}

/// Drives conversational turns against the model and the tool registry
///
/// Owns the conversation history as an explicit append-only log; it is the
/// single writer.
pub struct DialogueOrchestrator {
    transport: Arc<dyn ModelTransport>,
    tools: ToolRegistry,
    system_instruction: String,
    history: Vec<Content>,
}

impl DialogueOrchestrator {
    /// Create an orchestrator over a model transport and registered tools
    #[must_use]
    pub fn new(transport: Arc<dyn ModelTransport>, tools: ToolRegistry) -> Self {
        Self {
            transport,
            tools,
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            history: Vec::new(),
        }
    }

    /// Replace the system instruction (used by tests)
    pub fn set_system_instruction(&mut self, instruction: &str) {
        self.system_instruction = instruction.to_string();
    }

    /// The conversation so far
    #[must_use]
    pub fn history(&self) -> &[Content] {
        &self.history
    }

    fn request(&self) -> GenerateRequest {
        let tools = if self.tools.declarations().is_empty() {
            Vec::new()
        } else {
            vec![ToolSet {
                function_declarations: self.tools.declarations().to_vec(),
            }]
        };
        GenerateRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: Some(self.system_instruction.clone()),
                    ..Part::default()
                }],
            },
            contents: self.history.clone(),
            tools,
        }
    }

    /// Execute one conversational turn and return the spoken answer
    ///
    /// Loops while the model keeps requesting tool calls, bounded by
    /// [`MAX_TOOL_ROUNDS`]. Tool failures are surfaced to the model as data,
    /// not to the caller; model failures resolve to fixed messages.
    pub async fn run_turn(&mut self, user_text: &str) -> String {
        self.history.push(Content::user_text(user_text));

        for round in 0..=MAX_TOOL_ROUNDS {
            let reply = match self.transport.generate(&self.request()).await {
                Ok(content) => content,
                Err(Error::LlmQuota(msg)) => {
                    tracing::warn!(detail = %msg, "model quota exhausted");
                    return QUOTA_EXCEEDED.to_string();
                }
                Err(e) => {
                    tracing::error!(error = %e, "model exchange failed");
                    return PROCESSING_ERROR.to_string();
                }
            };
            self.history.push(reply.clone());

            let Some(first) = reply.parts.first() else {
                return NO_ANSWER.to_string();
            };

            if let Some(call) = &first.function_call {
                if round == MAX_TOOL_ROUNDS {
                    tracing::warn!(tool = %call.name, "tool round cap reached");
                    return NO_ANSWER.to_string();
                }
                let args = call.args.clone();
                let result = self.tools.invoke(&call.name, args).await;
                self.history
                    .push(Content::function_response(&call.name, result));
                continue;
            }

            if let Some(text) = &first.text
                && !text.trim().is_empty()
            {
                return text.clone();
            }
            return NO_ANSWER.to_string();
        }

        NO_ANSWER.to_string()
    }
}
