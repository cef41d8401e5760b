use crate::estimator::{estimate_message_tokens, estimate_tokens};
use crate::types::Message;

/// Split messages into at most `parts` contiguous chunks of roughly equal
/// token weight. `parts` is normalized to `1..=messages.len()`; the last
/// chunk absorbs any remainder, so no chunk is ever empty and concatenating
/// the chunks in order reproduces the input exactly.
pub fn split_by_token_share(messages: &[Message], parts: usize) -> Vec<Vec<Message>> {
    if messages.is_empty() {
        return Vec::new();
    }
    let parts = parts.max(1).min(messages.len());
    if parts <= 1 {
        return vec![messages.to_vec()];
    }

    let target = estimate_tokens(messages) as f64 / parts as f64;
    let mut chunks: Vec<Vec<Message>> = Vec::new();
    let mut current: Vec<Message> = Vec::new();
    let mut current_tokens = 0usize;

    for msg in messages {
        let tokens = estimate_message_tokens(msg);
        if !current.is_empty()
            && chunks.len() < parts - 1
            && (current_tokens + tokens) as f64 > target
        {
            chunks.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push(msg.clone());
        current_tokens += tokens;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split messages into contiguous chunks whose estimated token totals stay
/// within `max_tokens`. A message that alone exceeds the ceiling is emitted
/// as its own singleton chunk, never merged with neighbors and never
/// dropped. Exact order-preserving partition; no empty chunks.
pub fn split_by_max_tokens(messages: &[Message], max_tokens: usize) -> Vec<Vec<Message>> {
    let mut chunks: Vec<Vec<Message>> = Vec::new();
    let mut current: Vec<Message> = Vec::new();
    let mut current_tokens = 0usize;

    for msg in messages {
        let tokens = estimate_message_tokens(msg);
        if tokens > max_tokens {
            // Oversized: flush whatever is pending, then isolate it.
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            chunks.push(vec![msg.clone()]);
            continue;
        }
        if !current.is_empty() && current_tokens + tokens > max_tokens {
            chunks.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push(msg.clone());
        current_tokens += tokens;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(chunks: &[Vec<Message>]) -> Vec<String> {
        chunks
            .iter()
            .flatten()
            .map(|m| m.flatten_content())
            .collect()
    }

    fn assert_exact_partition(input: &[Message], chunks: &[Vec<Message>]) {
        let original: Vec<String> = input.iter().map(|m| m.flatten_content()).collect();
        assert_eq!(contents(chunks), original);
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_token_share_empty_input() {
        assert!(split_by_token_share(&[], 3).is_empty());
    }

    #[test]
    fn test_token_share_single_part() {
        let messages = vec![Message::user("a"), Message::user("b")];
        let chunks = split_by_token_share(&messages, 1);
        assert_eq!(chunks.len(), 1);
        assert_exact_partition(&messages, &chunks);
    }

    #[test]
    fn test_token_share_normalizes_excess_parts() {
        let messages = vec![Message::user("a"), Message::user("b")];
        let chunks = split_by_token_share(&messages, 10);
        assert!(chunks.len() <= 2);
        assert_exact_partition(&messages, &chunks);
    }

    #[test]
    fn test_token_share_zero_parts() {
        let messages = vec![Message::user("a"), Message::user("b")];
        let chunks = split_by_token_share(&messages, 0);
        assert_eq!(chunks.len(), 1);
        assert_exact_partition(&messages, &chunks);
    }

    #[test]
    fn test_token_share_roughly_equal_halves() {
        let messages: Vec<Message> = (0..10)
            .map(|i| Message::user(format!("message number {} {}", i, "pad ".repeat(20))))
            .collect();
        let chunks = split_by_token_share(&messages, 2);
        assert_eq!(chunks.len(), 2);
        assert_exact_partition(&messages, &chunks);
        // Uniform messages split close to the middle.
        assert!(chunks[0].len() >= 4 && chunks[0].len() <= 6);
    }

    #[test]
    fn test_token_share_last_chunk_absorbs_remainder() {
        let mut messages: Vec<Message> =
            (0..3).map(|_| Message::user("x".repeat(4000))).collect();
        for _ in 0..6 {
            messages.push(Message::user("tiny"));
        }
        let chunks = split_by_token_share(&messages, 3);
        assert!(chunks.len() <= 3);
        assert_exact_partition(&messages, &chunks);
    }

    #[test]
    fn test_max_tokens_empty_input() {
        assert!(split_by_max_tokens(&[], 100).is_empty());
    }

    #[test]
    fn test_max_tokens_accumulates_under_ceiling() {
        // Each message is 10 tokens (40 chars); ceiling 25 fits two per chunk.
        let messages: Vec<Message> =
            (0..6).map(|_| Message::user("x".repeat(40))).collect();
        let chunks = split_by_max_tokens(&messages, 25);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 2));
        assert_exact_partition(&messages, &chunks);
    }

    #[test]
    fn test_max_tokens_oversized_singleton() {
        let messages = vec![
            Message::user("small"),
            Message::user("x".repeat(10_000)),
            Message::user("also small"),
        ];
        let chunks = split_by_max_tokens(&messages, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].len(), 1);
        assert_eq!(chunks[1][0].char_count(), 10_000);
        assert_exact_partition(&messages, &chunks);
    }

    #[test]
    fn test_max_tokens_oversized_first() {
        let messages = vec![Message::user("x".repeat(10_000)), Message::user("small")];
        let chunks = split_by_max_tokens(&messages, 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 1);
        assert_exact_partition(&messages, &chunks);
    }
}
