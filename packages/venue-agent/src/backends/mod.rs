//! Model backends and their registry.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod registry;
pub mod tools;

pub use anthropic::AnthropicBackend;
pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use registry::BackendRegistry;
pub use tools::{ToolDefinition, EXTRACT_TOOL, NAVIGATE_TOOL};
