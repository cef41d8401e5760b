use crate::types::Message;

/// Approximate characters per token for estimation purposes.
///
/// This is a heuristic cost function, not a tokenizer. Every budget derived
/// from it must be treated as a soft limit with a safety margin.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token cost of a single message from its flattened content.
pub fn estimate_message_tokens(message: &Message) -> usize {
    message.char_count() / CHARS_PER_TOKEN
}

/// Estimate the total token cost of a message list.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, Message, MessageContent, Role};

    #[test]
    fn test_empty_list_is_zero() {
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn test_single_message() {
        // 8 chars / 4 chars-per-token = 2 tokens
        let msg = Message::user("12345678");
        assert_eq!(estimate_message_tokens(&msg), 2);
    }

    #[test]
    fn test_floors_partial_tokens() {
        let msg = Message::user("abcde"); // 5 chars -> 1 token
        assert_eq!(estimate_message_tokens(&msg), 1);
    }

    #[test]
    fn test_sum_over_messages() {
        let messages = vec![
            Message::user("x".repeat(400)),
            Message::assistant("y".repeat(200)),
        ];
        assert_eq!(estimate_tokens(&messages), 150);
    }

    #[test]
    fn test_tool_blocks_contribute() {
        let plain = Message::user("hi");
        let with_tool = Message::new(
            Role::User,
            MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: "tu-1".to_string(),
                content: "z".repeat(1000),
            }]),
        );
        assert!(estimate_message_tokens(&with_tool) > estimate_message_tokens(&plain));
    }
}
