//! Driver configuration.

use serde::{Deserialize, Serialize};

use crate::pipeline::prompts::TASK_PROMPT;

/// Configuration for the agent driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Maximum backend executions per task.
    ///
    /// When the cap is hit without any records the fallback extractor runs.
    /// Default: 50.
    pub turn_limit: usize,

    /// Instruction that opens each task's prompt buffer.
    pub task_prompt: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            turn_limit: 50,
            task_prompt: TASK_PROMPT.to_string(),
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the turn limit.
    pub fn with_turn_limit(mut self, turn_limit: usize) -> Self {
        self.turn_limit = turn_limit;
        self
    }

    /// Replace the task instruction.
    pub fn with_task_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.task_prompt = prompt.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: DriverConfig = serde_json::from_str(r#"{"turn_limit": 5}"#).unwrap();
        assert_eq!(config.turn_limit, 5);
        assert_eq!(config.task_prompt, TASK_PROMPT);
    }

    #[test]
    fn test_builders() {
        let config = DriverConfig::new().with_turn_limit(3).with_task_prompt("List bars");
        assert_eq!(config.turn_limit, 3);
        assert_eq!(config.task_prompt, "List bars");
    }
}
