use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::types::Message;

/// Default instructions for summarization calls. Overridable per call; the
/// target language of the summary is a caller concern, not engine logic.
pub const DEFAULT_SUMMARY_INSTRUCTIONS: &str =
    "Summarize the key points, decisions, and context from the conversation below. \
     Focus on: active tasks, decisions made, user preferences, constraints, and \
     open questions. Output only the summary, no preamble.";

/// Fixed system instruction sent with every summarization request.
pub const SUMMARIZER_SYSTEM_PROMPT: &str =
    "You are a conversation summarizer. Produce concise summaries that preserve \
     decisions, TODOs, open questions, and constraints.";

/// Why a summarization call failed. The engine only distinguishes success
/// from failure; the variants exist for client implementations and logs.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("http error: {0}")]
    Http(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("model returned an empty summary")]
    Empty,
}

/// One summarization request: a model, a system instruction, an output
/// ceiling, and a single user-role prompt.
#[derive(Debug, Clone, Serialize)]
pub struct SummarizeRequest {
    pub model: String,
    pub system: String,
    pub max_tokens: usize,
    pub prompt: String,
}

/// The single capability this engine consumes from its environment. The
/// engine never retries indefinitely and never threads cancellation through
/// this call; clients that need timeouts or aborts implement them inside
/// `summarize`.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    async fn summarize(&self, request: SummarizeRequest) -> Result<String, SummarizeError>;
}

/// Render messages one line per turn: `<role>: <flattened content>`.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.flatten_content()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the user prompt for one summarization call: instructions, an
/// optional previously-established summary, then the transcript.
pub fn build_summary_prompt(
    messages: &[Message],
    instructions: &str,
    previous_summary: Option<&str>,
) -> String {
    let mut sections: Vec<String> = vec![instructions.to_string()];
    if let Some(previous) = previous_summary {
        if !previous.is_empty() {
            sections.push(format!("Previously established summary:\n{}", previous));
        }
    }
    sections.push(format!("Conversation:\n{}", render_transcript(messages)));
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, MessageContent, Role};

    #[test]
    fn test_render_transcript_roles_and_order() {
        let messages = vec![
            Message::user("hello"),
            Message::assistant("hi there"),
            Message::system("note"),
        ];
        let rendered = render_transcript(&messages);
        assert_eq!(rendered, "user: hello\nassistant: hi there\nsystem: note");
    }

    #[test]
    fn test_render_transcript_flattens_blocks() {
        let messages = vec![Message::new(
            Role::Assistant,
            MessageContent::Blocks(vec![ContentBlock::ToolUse {
                name: "read_file".to_string(),
                input: serde_json::json!({"path": "a.txt"}),
            }]),
        )];
        let rendered = render_transcript(&messages);
        assert!(rendered.starts_with("assistant: [Tool use: read_file"));
    }

    #[test]
    fn test_prompt_includes_previous_summary() {
        let messages = vec![Message::user("more context")];
        let prompt = build_summary_prompt(
            &messages,
            DEFAULT_SUMMARY_INSTRUCTIONS,
            Some("we agreed on plan A"),
        );
        assert!(prompt.contains(DEFAULT_SUMMARY_INSTRUCTIONS));
        assert!(prompt.contains("Previously established summary:\nwe agreed on plan A"));
        assert!(prompt.contains("Conversation:\nuser: more context"));
    }

    #[test]
    fn test_prompt_skips_empty_previous_summary() {
        let prompt =
            build_summary_prompt(&[Message::user("x")], DEFAULT_SUMMARY_INSTRUCTIONS, Some(""));
        assert!(!prompt.contains("Previously established summary"));
    }
}
