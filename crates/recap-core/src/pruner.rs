use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::estimator::CHARS_PER_TOKEN;
use crate::types::{ContentBlock, Message, MessageContent, Role};

/// Share of the context window available for verbatim history.
pub const DEFAULT_MAX_HISTORY_SHARE: f64 = 0.5;

/// Number of trailing assistant turns that are never dropped.
pub const DEFAULT_KEEP_LAST_ASSISTANTS: usize = 3;

pub const DEFAULT_SOFT_TRIM_MAX_CHARS: usize = 4000;
pub const DEFAULT_SOFT_TRIM_HEAD_CHARS: usize = 1500;
pub const DEFAULT_SOFT_TRIM_TAIL_CHARS: usize = 1500;

/// Limits for shortening oversized tool-result payloads in kept messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftTrimSettings {
    /// Tool results longer than this (in characters) are trimmed.
    pub max_chars: usize,
    /// Leading characters preserved.
    pub head_chars: usize,
    /// Trailing characters preserved.
    pub tail_chars: usize,
}

impl Default for SoftTrimSettings {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_SOFT_TRIM_MAX_CHARS,
            head_chars: DEFAULT_SOFT_TRIM_HEAD_CHARS,
            tail_chars: DEFAULT_SOFT_TRIM_TAIL_CHARS,
        }
    }
}

/// Fully resolved pruning settings. Obtain via [`resolve_pruning_settings`],
/// which guarantees every field is in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningSettings {
    pub max_history_share: f64,
    pub keep_last_assistants: usize,
    pub soft_trim: SoftTrimSettings,
}

impl Default for PruningSettings {
    fn default() -> Self {
        Self {
            max_history_share: DEFAULT_MAX_HISTORY_SHARE,
            keep_last_assistants: DEFAULT_KEEP_LAST_ASSISTANTS,
            soft_trim: SoftTrimSettings::default(),
        }
    }
}

/// Caller-supplied partial settings. Every field is optional and may hold
/// out-of-range values; resolution coerces instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PruningOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_history_share: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_last_assistants: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_trim: Option<SoftTrimOverrides>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftTrimOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_chars: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_chars: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_chars: Option<f64>,
}

/// Outcome of a prune pass. `messages` and `dropped_messages` both preserve
/// original relative order; together they partition the input. Character
/// statistics are pre-trim, since they are what drove the drop decision;
/// `kept_chars_post_trim` reports the actual payload size after soft-trims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneResult {
    pub messages: Vec<Message>,
    pub dropped_messages: Vec<Message>,
    pub trimmed_tool_results: usize,
    pub total_chars: usize,
    pub kept_chars: usize,
    pub dropped_chars: usize,
    pub budget_chars: usize,
    pub kept_chars_post_trim: usize,
}

fn resolve_share(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => {
            if !(0.0..=1.0).contains(&v) {
                warn!(value = v, "max_history_share out of range, clamping");
            }
            v.clamp(0.0, 1.0)
        }
        Some(v) => {
            warn!(value = v, "max_history_share not finite, using default");
            DEFAULT_MAX_HISTORY_SHARE
        }
        None => DEFAULT_MAX_HISTORY_SHARE,
    }
}

fn resolve_count(value: Option<f64>, default: usize) -> usize {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => v.floor() as usize,
        Some(v) => {
            warn!(value = v, default, "count setting invalid, using default");
            default
        }
        None => default,
    }
}

/// Resolve caller overrides into valid settings. Total and idempotent:
/// never fails, never returns an out-of-range value, and resolving an
/// already-resolved value is a no-op.
pub fn resolve_pruning_settings(overrides: Option<&PruningOverrides>) -> PruningSettings {
    let overrides = overrides.cloned().unwrap_or_default();
    let soft = overrides.soft_trim.unwrap_or_default();

    let settings = PruningSettings {
        max_history_share: resolve_share(overrides.max_history_share),
        keep_last_assistants: resolve_count(
            overrides.keep_last_assistants,
            DEFAULT_KEEP_LAST_ASSISTANTS,
        ),
        soft_trim: SoftTrimSettings {
            max_chars: resolve_count(soft.max_chars, DEFAULT_SOFT_TRIM_MAX_CHARS),
            head_chars: resolve_count(soft.head_chars, DEFAULT_SOFT_TRIM_HEAD_CHARS),
            tail_chars: resolve_count(soft.tail_chars, DEFAULT_SOFT_TRIM_TAIL_CHARS),
        },
    };

    if settings.soft_trim.head_chars + settings.soft_trim.tail_chars
        >= settings.soft_trim.max_chars
    {
        warn!(
            head = settings.soft_trim.head_chars,
            tail = settings.soft_trim.tail_chars,
            max = settings.soft_trim.max_chars,
            "soft trim head + tail >= max_chars; trimmed results may not shrink"
        );
    }

    settings
}

/// Index of the first message in the protected zone: the suffix covering the
/// last `keep` assistant turns and any user turns interleaved with them.
/// Returns `messages.len()` when nothing is protected.
fn find_protected_start(messages: &[Message], keep: usize) -> usize {
    if keep == 0 {
        return messages.len();
    }
    let mut remaining = keep;
    let mut earliest_assistant = messages.len();
    for (i, msg) in messages.iter().enumerate().rev() {
        if msg.role == Role::Assistant {
            earliest_assistant = i;
            remaining -= 1;
            if remaining == 0 {
                return i;
            }
        }
    }
    // Fewer assistant turns than requested: protect from the earliest one.
    earliest_assistant
}

/// Shorten a tool-result payload to head + marker + tail. Character-indexed,
/// so multibyte content never splits mid-codepoint.
fn soft_trim_text(content: &str, settings: &SoftTrimSettings) -> Option<String> {
    let char_len = content.chars().count();
    if char_len <= settings.max_chars {
        return None;
    }
    if settings.head_chars + settings.tail_chars >= char_len {
        // Pathological config: nothing to omit, leave the payload alone.
        return None;
    }
    let omitted = char_len - settings.head_chars - settings.tail_chars;
    let head: String = content.chars().take(settings.head_chars).collect();
    let tail: String = content
        .chars()
        .skip(char_len - settings.tail_chars)
        .collect();
    Some(format!(
        "{}[Tool result trimmed: {} chars omitted]{}",
        head, omitted, tail
    ))
}

/// Apply soft-trimming to every tool-result block in a message.
/// Returns the (possibly rewritten) message and the number of trims.
fn soft_trim_message(message: &Message, settings: &SoftTrimSettings) -> (Message, usize) {
    let MessageContent::Blocks(blocks) = &message.content else {
        return (message.clone(), 0);
    };

    let mut trimmed = 0;
    let new_blocks: Vec<ContentBlock> = blocks
        .iter()
        .map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => match soft_trim_text(content, settings) {
                Some(shortened) => {
                    trimmed += 1;
                    ContentBlock::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: shortened,
                    }
                }
                None => block.clone(),
            },
            _ => block.clone(),
        })
        .collect();

    if trimmed == 0 {
        return (message.clone(), 0);
    }
    let mut message = message.clone();
    message.content = MessageContent::Blocks(new_blocks);
    (message, trimmed)
}

/// Decide which trailing subset of `messages` fits a character budget derived
/// from the context window, which leading subset to drop wholesale, and
/// soft-trim oversized tool results in the kept messages.
///
/// The protected zone (last `keep_last_assistants` assistant turns plus
/// interleaved user turns) is always kept, even when that exceeds the budget;
/// the overage is visible as `kept_chars > budget_chars`. The input is never
/// mutated.
pub fn prune_context_messages(
    messages: &[Message],
    context_window_tokens: usize,
    overrides: Option<&PruningOverrides>,
) -> PruneResult {
    let settings = resolve_pruning_settings(overrides);
    let budget_chars = (context_window_tokens as f64
        * settings.max_history_share
        * CHARS_PER_TOKEN as f64)
        .floor() as usize;

    if messages.is_empty() {
        return PruneResult {
            messages: Vec::new(),
            dropped_messages: Vec::new(),
            trimmed_tool_results: 0,
            total_chars: 0,
            kept_chars: 0,
            dropped_chars: 0,
            budget_chars,
            kept_chars_post_trim: 0,
        };
    }

    let char_counts: Vec<usize> = messages.iter().map(|m| m.char_count()).collect();
    let total_chars: usize = char_counts.iter().sum();
    let protected_start = find_protected_start(messages, settings.keep_last_assistants);

    // Newest to oldest: protected messages are kept unconditionally, the
    // rest only while they fit the remaining budget. The first message that
    // overflows ends the walk — everything older drops with it, so the
    // dropped set is always a contiguous prefix of the input.
    let mut keep = vec![false; messages.len()];
    let mut kept_chars = 0usize;
    let mut fits = true;
    for i in (0..messages.len()).rev() {
        if i >= protected_start {
            keep[i] = true;
            kept_chars += char_counts[i];
            continue;
        }
        if fits && kept_chars + char_counts[i] <= budget_chars {
            keep[i] = true;
            kept_chars += char_counts[i];
        } else {
            fits = false;
        }
    }

    let mut kept_messages = Vec::new();
    let mut dropped_messages = Vec::new();
    let mut trimmed_tool_results = 0usize;
    let mut kept_chars_post_trim = 0usize;
    for (i, msg) in messages.iter().enumerate() {
        if keep[i] {
            let (msg, trims) = soft_trim_message(msg, &settings.soft_trim);
            trimmed_tool_results += trims;
            kept_chars_post_trim += msg.char_count();
            kept_messages.push(msg);
        } else {
            dropped_messages.push(msg.clone());
        }
    }

    debug!(
        total = messages.len(),
        kept = kept_messages.len(),
        dropped = dropped_messages.len(),
        trimmed_tool_results,
        kept_chars,
        budget_chars,
        "Pruned context messages"
    );

    PruneResult {
        messages: kept_messages,
        dropped_messages,
        trimmed_tool_results,
        total_chars,
        kept_chars,
        dropped_chars: total_chars - kept_chars,
        budget_chars,
        kept_chars_post_trim,
    }
}
