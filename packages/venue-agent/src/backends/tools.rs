//! The two tools every backend offers the model.
//!
//! Parameter schemas are generated from the argument types with `schemars`,
//! with `$ref`s inlined since not every provider follows them.

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{BackendError, BackendResult};
use crate::types::{CallRef, ModelAction, Record, GENRES};

/// Name of the tool that requests more pages.
pub const NAVIGATE_TOOL: &str = "more_content";

/// Name of the tool that reports records and ends the conversation.
pub const EXTRACT_TOOL: &str = "list_escape_rooms";

const NAVIGATE_DESCRIPTION: &str = "For more content provide the URLs of the website. Most likely, call this first to get the content of the detail pages.";

const EXTRACT_DESCRIPTION: &str =
    "List all available escape rooms of the website. With this you are ending the conversation.";

/// Arguments of [`NAVIGATE_TOOL`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct NavigateArgs {
    /// Array of URLs to scrape (most relevant are escape room detail pages). The URLs must be valid URLs.
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Arguments of [`EXTRACT_TOOL`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExtractArgs {
    /// Array of escape rooms. The escape room data needs to be copied and formatted from the website.
    #[serde(default)]
    pub rooms: Vec<Record>,
}

/// Provider-neutral tool definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// OpenAI function-calling format.
    pub fn to_openai_format(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }

    /// Anthropic tool-use format.
    pub fn to_anthropic_format(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.parameters
        })
    }

    /// Gemini function declaration.
    ///
    /// Gemini accepts an OpenAPI subset, so schema keywords outside it are
    /// dropped.
    pub fn to_gemini_format(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": gemini_schema(&self.parameters)
        })
    }
}

/// Schema keywords a Gemini function declaration understands.
const GEMINI_SCHEMA_KEYS: &[&str] = &[
    "type", "format", "description", "nullable", "enum", "items", "properties", "required",
];

fn gemini_schema(schema: &Value) -> Value {
    let Value::Object(map) = schema else {
        return schema.clone();
    };

    let mut out = serde_json::Map::new();
    for (key, value) in map {
        if !GEMINI_SCHEMA_KEYS.contains(&key.as_str()) {
            continue;
        }
        let value = match key.as_str() {
            "items" => gemini_schema(value),
            "properties" => match value {
                Value::Object(properties) => Value::Object(
                    properties
                        .iter()
                        .map(|(name, property)| (name.clone(), gemini_schema(property)))
                        .collect(),
                ),
                other => other.clone(),
            },
            // `["string", "null"]` becomes a nullable string
            "type" => match value {
                Value::Array(types) => {
                    let mut concrete = types.iter().filter(|t| t.as_str() != Some("null"));
                    if types.len() > 1 {
                        out.insert("nullable".to_string(), Value::Bool(true));
                    }
                    concrete.next().cloned().unwrap_or(Value::Null)
                }
                other => other.clone(),
            },
            _ => value.clone(),
        };
        out.insert(key.clone(), value);
    }
    Value::Object(out)
}

/// Both tools, extraction first.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: EXTRACT_TOOL.to_string(),
            description: EXTRACT_DESCRIPTION.to_string(),
            parameters: parameters_schema::<ExtractArgs>(),
        },
        ToolDefinition {
            name: NAVIGATE_TOOL.to_string(),
            description: NAVIGATE_DESCRIPTION.to_string(),
            parameters: parameters_schema::<NavigateArgs>(),
        },
    ]
}

/// Turn one tool call into an action.
///
/// Unknown tool names and arguments that do not match the tool's schema are
/// a [`BackendError::Parse`].
pub fn parse_tool_call(call: CallRef, arguments: Value) -> BackendResult<ModelAction> {
    match call.tool_name.as_str() {
        NAVIGATE_TOOL => {
            let args: NavigateArgs = serde_json::from_value(arguments).map_err(|e| {
                BackendError::Parse(format!("invalid {NAVIGATE_TOOL} arguments: {e}"))
            })?;
            Ok(ModelAction::navigate(call, args.urls))
        }
        EXTRACT_TOOL => {
            let args: ExtractArgs = serde_json::from_value(arguments).map_err(|e| {
                BackendError::Parse(format!("invalid {EXTRACT_TOOL} arguments: {e}"))
            })?;
            Ok(ModelAction::extraction(call, args.rooms))
        }
        other => Err(BackendError::Parse(format!("unknown tool: {other}"))),
    }
}

/// Same as [`parse_tool_call`] for arguments sent as a JSON string.
pub fn parse_tool_call_str(call: CallRef, arguments: &str) -> BackendResult<ModelAction> {
    // some providers send "" for a call without arguments
    let value = if arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(arguments)
            .map_err(|e| BackendError::Parse(format!("tool arguments are not JSON: {e}")))?
    };
    parse_tool_call(call, value)
}

fn parameters_schema<T: JsonSchema>() -> Value {
    let mut value = serde_json::to_value(schema_for!(T)).unwrap_or_default();

    let definitions = value.get("definitions").cloned();
    if let Some(definitions) = definitions {
        inline_refs(&mut value, &definitions);
    }
    if let Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
        map.remove("title");
    }

    add_genre_enum(&mut value);
    value
}

fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(path)) = map.get("$ref").cloned() {
                let name = path.trim_start_matches("#/definitions/");
                if let Some(definition) = definitions.get(name) {
                    *value = definition.clone();
                    inline_refs(value, definitions);
                    return;
                }
            }
            for (_, v) in map.iter_mut() {
                inline_refs(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

/// Close the `genre` property over [`GENRES`] wherever a record schema appears.
fn add_genre_enum(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Object(genre)) = map
                .get_mut("properties")
                .and_then(|properties| properties.get_mut("genre"))
            {
                genre.insert("enum".to_string(), serde_json::json!(GENRES));
            }
            for (_, v) in map.iter_mut() {
                add_genre_enum(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(add_genre_enum),
        _ => {}
    }
}
