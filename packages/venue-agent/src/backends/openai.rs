//! OpenAI-compatible chat completions backend.
//!
//! Speaks the `/chat/completions` function-calling protocol, which OpenAI,
//! Mistral, Together and AI21 all accept, so one implementation serves every
//! vendor that differs only in base URL and model name.
//!
//! # Example
//!
//! ```rust,ignore
//! use venue_agent::backends::OpenAiBackend;
//!
//! let gpt = OpenAiBackend::openai(token, "gpt-4o-mini");
//! let mistral = OpenAiBackend::mistral(token, "mistral-large-latest");
//! ```

use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::tools::{parse_tool_call_str, tool_definitions, EXTRACT_TOOL, NAVIGATE_TOOL};
use crate::error::{BackendError, BackendResult};
use crate::pipeline::prompts::{ONE_TOOL_AT_A_TIME, SYSTEM_PROMPT};
use crate::security::ApiKey;
use crate::traits::backend::{Backend, ToolMode};
use crate::types::{CallRef, Execution, Turn};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
pub const TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";
pub const JAMBA_BASE_URL: &str = "https://api.ai21.com/studio/v1";

/// Backend for any OpenAI-compatible chat completions API.
pub struct OpenAiBackend {
    http: Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
    display_name: Option<String>,
    image_support: bool,
    tools: Vec<Value>,
    messages: Vec<ChatMessage>,
    mode: ToolMode,
}

impl OpenAiBackend {
    /// Create a backend for `model` against the OpenAI API.
    pub fn new(api_key: impl Into<ApiKey>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
            display_name: None,
            image_support: false,
            tools: tool_definitions()
                .iter()
                .map(|tool| tool.to_openai_format())
                .collect(),
            messages: Vec::new(),
            mode: ToolMode::default(),
        }
    }

    pub fn openai(api_key: impl Into<ApiKey>, model: impl Into<String>) -> Self {
        Self::new(api_key, model)
    }

    pub fn mistral(api_key: impl Into<ApiKey>, model: impl Into<String>) -> Self {
        Self::new(api_key, model).with_base_url(MISTRAL_BASE_URL)
    }

    pub fn together(api_key: impl Into<ApiKey>, model: impl Into<String>) -> Self {
        Self::new(api_key, model).with_base_url(TOGETHER_BASE_URL)
    }

    pub fn jamba(api_key: impl Into<ApiKey>, model: impl Into<String>) -> Self {
        Self::new(api_key, model).with_base_url(JAMBA_BASE_URL)
    }

    /// Set a custom base URL (proxies, other compatible vendors).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Report a different name than the model id.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Forward turn images as data URLs.
    pub fn with_image_support(mut self, enabled: bool) -> Self {
        self.image_support = enabled;
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn tool_choice(&self) -> Value {
        let forced = |name: &str| serde_json::json!({"type": "function", "function": {"name": name}});
        match self.mode {
            ToolMode::ExtractOnly => forced(EXTRACT_TOOL),
            ToolMode::Navigate if !self.has_replied() => forced(NAVIGATE_TOOL),
            _ => Value::String("required".to_string()),
        }
    }

    fn has_replied(&self) -> bool {
        self.messages.iter().any(|m| m.role == "assistant")
    }

    async fn send(&self, request: &ChatRequest<'_>) -> BackendResult<ChatResponse> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(backend = %self.name(), error = %e, "chat completion request failed");
                BackendError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(backend = %self.name(), status = %status, error = %message, "chat completion API error");
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
impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.model)
    }

    fn supports_images(&self) -> bool {
        self.image_support
    }

    fn add_turn(&mut self, turn: Turn) {
        if self.messages.is_empty() {
            self.messages.push(ChatMessage::system(SYSTEM_PROMPT));
            self.messages.push(ChatMessage::system(ONE_TOOL_AT_A_TIME));
        }

        let message = match turn.reply_to {
            Some(call) => ChatMessage::tool(call, turn.text),
            None => match turn.image.filter(|_| self.image_support) {
                Some(image) => ChatMessage::user_with_image(turn.text, &image),
                None => ChatMessage::user(turn.text),
            },
        };
        self.messages.push(message);
    }

    async fn execute(&mut self, cancel: &CancellationToken) -> BackendResult<Execution> {
        let request = ChatRequest {
            model: &self.model,
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

        let token_count = response.usage.map(|u| u.total_tokens).unwrap_or(0);
        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or(BackendError::NoChoices)?;

        let actions = message
            .tool_calls
            .iter()
            .map(|tc| {
                parse_tool_call_str(
                    CallRef::new(&tc.id, &tc.function.name),
                    &tc.function.arguments,
                )
            })
            .collect::<BackendResult<Vec<_>>>();

        self.messages.push(ChatMessage::assistant(message));
        let actions = actions?;

        debug!(
            backend = %self.name(),
            actions = actions.len(),
            token_count,
            duration_ms = duration.as_millis() as u64,
            "chat completion"
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
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    tools: &'a [Value],
    tool_choice: Value,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: Option<MessageContent>) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    fn system(text: &str) -> Self {
        Self::new("system", Some(MessageContent::Text(text.to_string())))
    }

    fn user(text: String) -> Self {
        Self::new("user", Some(MessageContent::Text(text)))
    }

    fn user_with_image(text: String, image: &[u8]) -> Self {
        let data = base64::engine::general_purpose::STANDARD.encode(image);
        Self::new(
            "user",
            Some(MessageContent::Parts(vec![
                ContentPart::Text { text },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/webp;base64,{data}"),
                    },
                },
            ])),
        )
    }

    fn tool(call: CallRef, text: String) -> Self {
        Self {
            tool_call_id: Some(call.id),
            name: Some(call.tool_name),
            ..Self::new("tool", Some(MessageContent::Text(text)))
        }
    }

    fn assistant(message: AssistantMessage) -> Self {
        Self {
            tool_calls: message.tool_calls,
            ..Self::new("assistant", message.content.map(MessageContent::Text))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}
