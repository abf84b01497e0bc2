//! Anthropic messages API backend.

use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::tools::{parse_tool_call, tool_definitions, EXTRACT_TOOL, NAVIGATE_TOOL};
use crate::error::{BackendError, BackendResult};
use crate::pipeline::prompts::SYSTEM_PROMPT;
use crate::security::ApiKey;
use crate::traits::backend::{Backend, ToolMode};
use crate::types::{CallRef, Execution, Turn};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 8192;

/// Backend for Claude models.
///
/// Tool results for one assistant turn must arrive in a single user message,
/// so replies are appended to the trailing user message instead of opening a
/// new one.
pub struct AnthropicBackend {
    http: Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
    image_support: bool,
    tools: Vec<Value>,
    messages: Vec<ApiMessage>,
    mode: ToolMode,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<ApiKey>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            model: model.into(),
            image_support: false,
            tools: tool_definitions()
                .iter()
                .map(|tool| tool.to_anthropic_format())
                .collect(),
            messages: Vec::new(),
            mode: ToolMode::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_image_support(mut self, enabled: bool) -> Self {
        self.image_support = enabled;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    fn tool_choice(&self) -> Value {
        let forced = |name: &str| serde_json::json!({"type": "tool", "name": name});
        match self.mode {
            ToolMode::ExtractOnly => forced(EXTRACT_TOOL),
            ToolMode::Navigate if !self.messages.iter().any(|m| m.role == "assistant") => {
                forced(NAVIGATE_TOOL)
            }
            _ => serde_json::json!({"type": "any"}),
        }
    }

    fn push_user_blocks(&mut self, blocks: Vec<ContentBlock>) {
        match self.messages.last_mut() {
            Some(last) if last.role == "user" => last.content.extend(blocks),
            _ => self.messages.push(ApiMessage {
                role: "user".to_string(),
                content: blocks,
            }),
        }
    }

    async fn send(&self, request: &ApiRequest<'_>) -> BackendResult<ApiResponse> {
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(backend = %self.model, error = %e, "messages request failed");
                BackendError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(backend = %self.model, status = %status, error = %message, "messages API error");
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.model
    }

    fn supports_images(&self) -> bool {
        self.image_support
    }

    fn add_turn(&mut self, turn: Turn) {
        let mut blocks = match turn.reply_to {
            Some(call) => vec![ContentBlock::ToolResult {
                tool_use_id: call.id,
                content: turn.text,
            }],
            None => vec![ContentBlock::Text { text: turn.text }],
        };

        if let Some(image) = turn.image.filter(|_| self.image_support) {
            blocks.push(ContentBlock::Image {
                source: ImageSource {
                    kind: "base64".to_string(),
                    media_type: "image/webp".to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(image),
                },
            });
        }

        self.push_user_blocks(blocks);
    }

    async fn execute(&mut self, cancel: &CancellationToken) -> BackendResult<Execution> {
        let request = ApiRequest {
            model: &self.model,
            system: SYSTEM_PROMPT,
            max_tokens: MAX_TOKENS,
            messages: &self.messages,
            tools: &self.tools,
            tool_choice: self.tool_choice(),
        };

        let start = Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackendError::Cancelled),
            response = self.send(&request) => response?,
        };
        let duration = start.elapsed();

        let content: Vec<ContentBlock> = response
            .content
            .into_iter()
            .filter(|block| !matches!(block, ContentBlock::Unsupported))
            .collect();
        if content.is_empty() {
            return Err(BackendError::NoChoices);
        }

        let actions = content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some(parse_tool_call(CallRef::new(id, name), input.clone()))
                }
                _ => None,
            })
            .collect::<BackendResult<Vec<_>>>();

        self.messages.push(ApiMessage {
            role: "assistant".to_string(),
            content,
        });
        let actions = actions?;

        let token_count = response.usage.input_tokens + response.usage.output_tokens;
        debug!(
            backend = %self.model,
            actions = actions.len(),
            token_count,
            duration_ms = duration.as_millis() as u64,
            "messages call"
        );

        Ok(Execution {
            actions,
            duration,
            token_count,
        })
    }

    fn reset_conversation(&mut self) {
        self.messages.clear();
    }

    fn set_guided(&mut self, guided: bool) {
        self.mode = if guided {
            ToolMode::Navigate
        } else {
            ToolMode::Any
        };
    }

    fn force_extraction_only(&mut self) {
        self.mode = ToolMode::ExtractOnly;
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    system: &'a str,
    max_tokens: u32,
    messages: &'a [ApiMessage],
    tools: &'a [Value],
    tool_choice: Value,
}

#[derive(Debug, Clone, Serialize)]
struct ApiMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Block types this backend does not replay (e.g. thinking).
    #[serde(other, skip_serializing)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool_use_response(blocks: Value) -> Value {
        serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-5-sonnet-20241022",
            "content": blocks,
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 900, "output_tokens": 100}
        })
    }

    async fn mount(server: &MockServer, body: Value) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn sent_bodies(server: &MockServer) -> Vec<Value> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.body_json::<Value>().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_execute_parses_parallel_tool_use() {
        let server = MockServer::start().await;
        mount(
            &server,
            tool_use_response(serde_json::json!([
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_1", "name": NAVIGATE_TOOL, "input": {"urls": ["/a"]}},
                {"type": "tool_use", "id": "toolu_2", "name": NAVIGATE_TOOL, "input": {"urls": ["/b"]}}
            ])),
        )
        .await;

        let mut backend = AnthropicBackend::new("test-key", "claude-3-5-sonnet-20241022")
            .with_base_url(server.uri());
        backend.add_turn(Turn::user("List all rooms"));

        let execution = backend.execute(&CancellationToken::new()).await.unwrap();
        assert_eq!(execution.token_count, 1000);
        assert_eq!(execution.actions.len(), 2);
        assert_eq!(execution.actions[1].call.id, "toolu_2");

        let body = &sent_bodies(&server).await[0];
        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["system"], SYSTEM_PROMPT);
        assert_eq!(body["tool_choice"]["type"], "any");
        assert_eq!(body["tools"][0]["name"], EXTRACT_TOOL);
        assert!(body["tools"][0]["input_schema"].is_object());
    }

    #[tokio::test]
    async fn test_tool_results_merge_into_one_user_message() {
        let server = MockServer::start().await;
        mount(
            &server,
            tool_use_response(serde_json::json!([
                {"type": "tool_use", "id": "toolu_1", "name": NAVIGATE_TOOL, "input": {"urls": []}},
                {"type": "tool_use", "id": "toolu_2", "name": NAVIGATE_TOOL, "input": {"urls": ["/b"]}}
            ])),
        )
        .await;

        let mut backend = AnthropicBackend::new("test-key", "claude").with_base_url(server.uri());
        let cancel = CancellationToken::new();
        backend.add_turn(Turn::user("start"));
        let execution = backend.execute(&cancel).await.unwrap();

        backend.add_turn(Turn::answer(&execution.actions[0].call, "added"));
        backend.add_turn(Turn::answer(&execution.actions[1].call, "page b"));
        backend.execute(&cancel).await.unwrap();

        let body = &sent_bodies(&server).await[1];
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["role"], "user");

        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["type"], "tool_result");
        assert_eq!(results[0]["tool_use_id"], "toolu_1");
        assert_eq!(results[1]["content"], "page b");
    }

    #[tokio::test]
    async fn test_extraction_only_tool_choice() {
        let server = MockServer::start().await;
        mount(
            &server,
            tool_use_response(serde_json::json!([
                {"type": "tool_use", "id": "toolu_1", "name": EXTRACT_TOOL, "input": {"rooms": []}}
            ])),
        )
        .await;

        let mut backend = AnthropicBackend::new("test-key", "claude").with_base_url(server.uri());
        backend.force_extraction_only();
        backend.reset_conversation();
        backend.add_turn(Turn::user("page"));
        backend.execute(&CancellationToken::new()).await.unwrap();

        let body = &sent_bodies(&server).await[0];
        assert_eq!(body["tool_choice"], serde_json::json!({"type": "tool", "name": EXTRACT_TOOL}));
    }

    #[tokio::test]
    async fn test_empty_content_is_no_choices() {
        let server = MockServer::start().await;
        mount(&server, tool_use_response(serde_json::json!([]))).await;

        let mut backend = AnthropicBackend::new("test-key", "claude").with_base_url(server.uri());
        backend.add_turn(Turn::user("start"));

        let result = backend.execute(&CancellationToken::new()).await;
        assert!(matches!(result, Err(BackendError::NoChoices)));
    }

    #[tokio::test]
    async fn test_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"type":"error","error":{"type":"invalid_request_error","message":"prompt is too long"}}"#,
            ))
            .mount(&server)
            .await;

        let mut backend = AnthropicBackend::new("test-key", "claude").with_base_url(server.uri());
        backend.add_turn(Turn::user("start"));

        match backend.execute(&CancellationToken::new()).await {
            Err(BackendError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("prompt is too long"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_blocks_deserialize() {
        let response: ApiResponse = serde_json::from_value(tool_use_response(serde_json::json!([
            {"type": "thinking", "thinking": "hmm", "signature": "x"},
            {"type": "text", "text": "done"}
        ])))
        .unwrap();

        assert!(matches!(response.content[0], ContentBlock::Unsupported));
        assert!(matches!(response.content[1], ContentBlock::Text { .. }));
    }
}
