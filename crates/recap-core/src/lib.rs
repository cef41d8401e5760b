//! Context compaction and pruning engine.
//!
//! Keeps a growing conversational transcript inside a model's finite context
//! window: estimates sizes, prunes history against a character budget while
//! protecting the most recent assistant turns, soft-trims oversized tool
//! results, and turns the dropped prefix into a single summary message via a
//! pluggable summarization client.
//!
//! The engine never mutates the caller's transcript and never returns an
//! error: malformed settings are coerced to defaults, and summarization
//! failures degrade step by step down to a fixed placeholder string.

pub mod chunking;
pub mod compaction;
pub mod estimator;
pub mod pruner;
pub mod summarizer;
pub mod types;

pub use chunking::{split_by_max_tokens, split_by_token_share};
pub use compaction::{
    build_compaction_summary, compact_history_if_needed, compute_adaptive_chunk_ratio,
    should_trigger_compaction, summarize_in_stages, summarize_with_fallback, CompactionResult,
    SummarizeOptions,
};
pub use estimator::{estimate_message_tokens, estimate_tokens, CHARS_PER_TOKEN};
pub use pruner::{
    prune_context_messages, resolve_pruning_settings, PruneResult, PruningOverrides,
    PruningSettings, SoftTrimOverrides, SoftTrimSettings,
};
pub use summarizer::{
    SummarizationClient, SummarizeError, SummarizeRequest, DEFAULT_SUMMARY_INSTRUCTIONS,
};
pub use types::{ContentBlock, Message, MessageContent, Role};
