//! Gemini backend on Vertex AI.
//!
//! Calls `generateContent` with the whole conversation each turn. Function
//! calling runs in `ANY` mode; guided and extraction-only modes narrow
//! `allowedFunctionNames` instead of forcing a single call.

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

const TEMPERATURE: f32 = 0.5;

/// Backend for Gemini models served by Vertex AI.
///
/// Gemini function calls carry no ids, so each call gets a synthetic one;
/// replies are matched back by function name. All replies to one model turn
/// go into a single user content.
pub struct GeminiBackend {
    http: Client,
    access_token: ApiKey,
    base_url: String,
    project: String,
    location: String,
    model: String,
    image_support: bool,
    tools: Vec<Value>,
    contents: Vec<Content>,
    mode: ToolMode,
    calls: usize,
}

impl GeminiBackend {
    /// `access_token` is an OAuth token, e.g. from `gcloud auth print-access-token`.
    pub fn vertex(
        project: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<ApiKey>,
        model: impl Into<String>,
    ) -> Self {
        let location = location.into();
        Self {
            http: Client::new(),
            access_token: access_token.into(),
            base_url: format!("https://{location}-aiplatform.googleapis.com/v1"),
            project: project.into(),
            location,
            model: model.into(),
            image_support: false,
            tools: tool_definitions()
                .iter()
                .map(|tool| tool.to_gemini_format())
                .collect(),
            contents: Vec::new(),
            mode: ToolMode::default(),
            calls: 0,
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

    fn endpoint(&self) -> String {
        format!(
            "{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.base_url, self.project, self.location, self.model
        )
    }

    fn allowed_functions(&self) -> Vec<&'static str> {
        match self.mode {
            ToolMode::ExtractOnly => vec![EXTRACT_TOOL],
            ToolMode::Navigate if !self.contents.iter().any(|c| c.role == "model") => {
                vec![NAVIGATE_TOOL]
            }
            _ => vec![NAVIGATE_TOOL, EXTRACT_TOOL],
        }
    }

    fn push_user_parts(&mut self, parts: Vec<Part>) {
        match self.contents.last_mut() {
            Some(last) if last.role == "user" => last.parts.extend(parts),
            _ => self.contents.push(Content {
                role: "user".to_string(),
                parts,
            }),
        }
    }

    async fn send(&self, request: &GenerateRequest<'_>) -> BackendResult<GenerateResponse> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.access_token.expose())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(backend = %self.model, error = %e, "generateContent request failed");
                BackendError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(backend = %self.model, status = %status, error = %message, "generateContent API error");
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
impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    fn supports_images(&self) -> bool {
        self.image_support
    }

    fn add_turn(&mut self, turn: Turn) {
        let mut parts = match turn.reply_to {
            Some(call) => vec![Part::function_response(call.tool_name, turn.text)],
            None => vec![Part::text(turn.text)],
        };

        if let Some(image) = turn.image.filter(|_| self.image_support) {
            parts.push(Part::image(&image));
        }

        self.push_user_parts(parts);
    }

    async fn execute(&mut self, cancel: &CancellationToken) -> BackendResult<Execution> {
        let request = GenerateRequest {
            system_instruction: Content {
                role: "system".to_string(),
                parts: vec![Part::text(SYSTEM_PROMPT.to_string())],
            },
            contents: &self.contents,
            tools: vec![ToolGroup {
                function_declarations: &self.tools,
            }],
            tool_config: ToolConfig {
                function_calling_config: FunctionCallingConfig {
                    mode: "ANY",
                    allowed_function_names: self.allowed_functions(),
                },
            },
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
        };

        let start = Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackendError::Cancelled),
            response = self.send(&request) => response?,
        };
        let duration = start.elapsed();

        let content = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .filter(|content| !content.parts.is_empty())
            .ok_or(BackendError::NoChoices)?;

        let actions = content
            .parts
            .iter()
            .filter_map(|part| part.function_call.as_ref())
            .map(|call| {
                self.calls += 1;
                let id = format!("{}-{}", call.name, self.calls);
                // calls without arguments may omit `args`
                let args = match &call.args {
                    Value::Null => Value::Object(Default::default()),
                    args => args.clone(),
                };
                parse_tool_call(CallRef::new(id, &call.name), args)
            })
            .collect::<BackendResult<Vec<_>>>();

        self.contents.push(Content {
            role: "model".to_string(),
            parts: content.parts,
        });
        let actions = actions?;

        let token_count = response
            .usage_metadata
            .map(|usage| usage.total_token_count)
            .unwrap_or(0);
        debug!(
            backend = %self.model,
            actions = actions.len(),
            token_count,
            duration_ms = duration.as_millis() as u64,
            "generateContent call"
        );

        Ok(Execution {
            actions,
            duration,
            token_count,
        })
    }

    fn reset_conversation(&mut self) {
        self.contents.clear();
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
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content,
    contents: &'a [Content],
    tools: Vec<ToolGroup<'a>>,
    tool_config: ToolConfig,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolGroup<'a> {
    function_declarations: &'a [Value],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig {
    function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionCallingConfig {
    mode: &'static str,
    allowed_function_names: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

/// One part of a content. Exactly one field is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Default::default()
        }
    }

    fn image(image: &[u8]) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: "image/webp".to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(image),
            }),
            ..Default::default()
        }
    }

    fn function_response(name: String, content: String) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name,
                response: serde_json::json!({ "content": content }),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: u64,
}
