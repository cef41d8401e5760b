use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Lowercase label used in transcript renderings ("user: ...").
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One block of structured message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

/// Message content: either a plain string or an ordered block sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One turn of the transcript. Timestamps are assumed monotonically
/// non-decreasing in transcript order; this engine reads them but never
/// enforces that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self {
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(text.into()))
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, MessageContent::Text(text.into()))
    }

    /// Flatten the content to a single line of text. String content is
    /// returned verbatim; content blocks become inline bracketed tags for
    /// tool use and tool results. Used for both size estimation and
    /// transcript rendering so the two always agree.
    pub fn flatten_content(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => {
                let parts: Vec<String> = blocks
                    .iter()
                    .map(|block| match block {
                        ContentBlock::Text { text } => text.clone(),
                        ContentBlock::ToolUse { name, input } => {
                            let input_str =
                                serde_json::to_string(input).unwrap_or_default();
                            format!("[Tool use: {} {}]", name, input_str)
                        }
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                        } => {
                            format!("[Tool result {}: {}]", tool_use_id, content)
                        }
                    })
                    .collect();
                parts.join(" ")
            }
        }
    }

    /// Character count of the flattened content.
    pub fn char_count(&self) -> usize {
        self.flatten_content().chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_plain_text() {
        let msg = Message::user("hello world");
        assert_eq!(msg.flatten_content(), "hello world");
        assert_eq!(msg.char_count(), 11);
    }

    #[test]
    fn test_flatten_blocks() {
        let msg = Message::new(
            Role::Assistant,
            MessageContent::Blocks(vec![
                ContentBlock::Text {
                    text: "Let me check".to_string(),
                },
                ContentBlock::ToolUse {
                    name: "web_search".to_string(),
                    input: serde_json::json!({"query": "rust"}),
                },
                ContentBlock::ToolResult {
                    tool_use_id: "tu-1".to_string(),
                    content: "3 results".to_string(),
                },
            ]),
        );
        let flat = msg.flatten_content();
        assert!(flat.contains("Let me check"));
        assert!(flat.contains("[Tool use: web_search"));
        assert!(flat.contains("[Tool result tu-1: 3 results]"));
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_content_block_tagged_serde() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "tu-9".to_string(),
            content: "ok".to_string(),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "tu-9");

        let back: ContentBlock = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn test_message_content_untagged() {
        let msg = Message::user("plain");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "plain");

        let parsed: Message = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.content, MessageContent::Text("plain".to_string()));
    }

    #[test]
    fn test_char_count_multibyte() {
        let msg = Message::user("héllo 世界");
        // 8 characters, more than 8 bytes
        assert_eq!(msg.char_count(), 8);
    }
}
