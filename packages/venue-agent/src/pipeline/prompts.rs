//! Prompts shared by the driver and the backends.

/// System prompt every backend sends ahead of the first turn.
pub const SYSTEM_PROMPT: &str = "You are a website parser bot. You can interact with the websites provided and retrieve content from them. You can navigate to a URL to get more content or end the conversation. Your goal is to provide as much information from the website as possible about the requested topic.";

/// Extra instruction for backends that would otherwise fan out tool calls.
pub const ONE_TOOL_AT_A_TIME: &str = "Only call one tool function at a time";

/// Default instruction that opens every task's prompt buffer.
pub const TASK_PROMPT: &str = "List all escape rooms of the website. If there is, use the Escape Room detail pages as content source.";

/// Reply to a call that needed no content.
pub const ACKNOWLEDGEMENT: &str = "added";

/// Render one fetched page for the conversation.
pub fn page_block(url: &str, content: &str) -> String {
    format!("Current URL: {url}; Current website content: {content}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_block_format() {
        assert_eq!(
            page_block("https://a.example", "<p>x</p>"),
            "Current URL: https://a.example; Current website content: <p>x</p>"
        );
    }
}
