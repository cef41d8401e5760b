use tracing::{debug, warn};

use crate::chunking::{split_by_max_tokens, split_by_token_share};
use crate::estimator::{estimate_message_tokens, estimate_tokens};
use crate::pruner::{prune_context_messages, PruneResult, PruningOverrides};
use crate::summarizer::{
    build_summary_prompt, SummarizationClient, SummarizeError, SummarizeRequest,
    DEFAULT_SUMMARY_INSTRUCTIONS, SUMMARIZER_SYSTEM_PROMPT,
};
use crate::types::Message;

/// Context-window occupancy above which compaction should run. Distinct
/// from the pruner's history share: the trigger governs when to summarize,
/// the share governs how much verbatim history survives afterwards.
pub const DEFAULT_TRIGGER_RATIO: f64 = 0.75;

/// Chunk size as a share of the context window when messages are typical.
pub const BASE_CHUNK_RATIO: f64 = 0.4;

/// Floor for the adaptive chunk ratio.
pub const MIN_CHUNK_RATIO: f64 = 0.15;

/// Inflation applied to size estimates to absorb estimator inaccuracy.
pub const SAFETY_MARGIN: f64 = 1.2;

/// Average-message-to-window share above which chunks start shrinking.
const AVG_SHARE_THRESHOLD: f64 = 0.1;

/// Transcripts shorter than this skip the split-then-merge stage.
pub const MIN_MESSAGES_FOR_SPLIT: usize = 4;

/// Number of roughly-equal parts used by the staged split.
const SPLIT_PARTS: usize = 2;

/// Requested summary lengths are clamped up to this many tokens.
pub const MIN_SUMMARY_TOKENS: usize = 512;

pub const DEFAULT_SUMMARY_TOKENS: usize = 1024;

const EMPTY_TRANSCRIPT_SUMMARY: &str = "No conversation history to summarize.";

const MERGE_INSTRUCTIONS: &str =
    "The messages below are partial summaries of one longer conversation. Merge \
     them into a single coherent summary, preserving decisions, TODOs, open \
     questions, and constraints.";

/// Per-call knobs for summary generation.
#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub model: String,
    pub max_summary_tokens: usize,
    /// Replaces [`DEFAULT_SUMMARY_INSTRUCTIONS`] when set.
    pub custom_instructions: Option<String>,
    /// Carried into the first chunk's prompt as established context.
    pub previous_summary: Option<String>,
    /// Target language for the summary; appended to the instructions.
    pub language: Option<String>,
}

impl Default for SummarizeOptions {
    fn default() -> Self {
        Self {
            model: "sonnet".to_string(),
            max_summary_tokens: DEFAULT_SUMMARY_TOKENS,
            custom_instructions: None,
            previous_summary: None,
            language: None,
        }
    }
}

impl SummarizeOptions {
    fn effective_instructions(&self) -> String {
        let mut instructions = self
            .custom_instructions
            .clone()
            .unwrap_or_else(|| DEFAULT_SUMMARY_INSTRUCTIONS.to_string());
        if let Some(language) = &self.language {
            instructions.push_str(&format!("\nRespond in {}.", language));
        }
        instructions
    }
}

/// Produced only when compaction actually ran.
#[derive(Debug, Clone)]
pub struct CompactionResult {
    pub summary: String,
    /// The summary as a transcript turn, ready for the caller to re-inject.
    pub summary_message: Message,
    pub prune_result: PruneResult,
}

/// True iff the estimated transcript size exceeds the trigger threshold.
/// `trigger_ratio` is clamped to `[0, 1]`; missing or non-finite values fall
/// back to [`DEFAULT_TRIGGER_RATIO`].
pub fn should_trigger_compaction(
    messages: &[Message],
    context_window_tokens: usize,
    trigger_ratio: Option<f64>,
) -> bool {
    let ratio = trigger_ratio
        .filter(|r| r.is_finite())
        .map(|r| r.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_TRIGGER_RATIO);
    let threshold = (context_window_tokens as f64 * ratio).floor() as usize;
    estimate_tokens(messages) > threshold
}

/// Chunk-size ratio adapted to observed message sizes. Large average
/// messages (relative to the window, after the safety margin) would overflow
/// the summarizer's own input limits, so the base ratio shrinks
/// proportionally to the overage, floored at [`MIN_CHUNK_RATIO`].
pub fn compute_adaptive_chunk_ratio(messages: &[Message], context_window_tokens: usize) -> f64 {
    if messages.is_empty() || context_window_tokens == 0 {
        return BASE_CHUNK_RATIO;
    }
    let avg_tokens =
        estimate_tokens(messages) as f64 / messages.len() as f64 * SAFETY_MARGIN;
    let share = avg_tokens / context_window_tokens as f64;
    if share <= AVG_SHARE_THRESHOLD {
        return BASE_CHUNK_RATIO;
    }
    (BASE_CHUNK_RATIO * AVG_SHARE_THRESHOLD / share).clamp(MIN_CHUNK_RATIO, BASE_CHUNK_RATIO)
}

async fn call_summarizer(
    client: &dyn SummarizationClient,
    messages: &[Message],
    instructions: &str,
    previous_summary: Option<&str>,
    opts: &SummarizeOptions,
) -> Result<String, SummarizeError> {
    let prompt = build_summary_prompt(messages, instructions, previous_summary);
    let request = SummarizeRequest {
        model: opts.model.clone(),
        system: SUMMARIZER_SYSTEM_PROMPT.to_string(),
        max_tokens: opts.max_summary_tokens,
        prompt,
    };
    let summary = client.summarize(request).await?;
    if summary.trim().is_empty() {
        return Err(SummarizeError::Empty);
    }
    Ok(summary)
}

/// Summarize chunks in order, carrying the running summary into the next
/// chunk's prompt. Sequential on purpose: each call refines one summary, so
/// chunk N depends on chunk N-1's output.
async fn summarize_chunks_sequentially(
    client: &dyn SummarizationClient,
    chunks: &[Vec<Message>],
    instructions: &str,
    initial_summary: Option<&str>,
    opts: &SummarizeOptions,
) -> Result<String, SummarizeError> {
    let mut running: Option<String> = initial_summary.map(str::to_string);
    for chunk in chunks {
        let summary =
            call_summarizer(client, chunk, instructions, running.as_deref(), opts).await?;
        running = Some(summary);
    }
    running.ok_or(SummarizeError::Empty)
}

/// Single-pass chunked summarization with the degradation ladder: a failed
/// run is retried with oversized messages excluded (each replaced by a
/// one-line note), and if that fails too, a fixed placeholder reporting the
/// message count is returned. Never errors out.
pub async fn summarize_with_fallback(
    client: &dyn SummarizationClient,
    messages: &[Message],
    max_chunk_tokens: usize,
    context_window_tokens: usize,
    opts: &SummarizeOptions,
) -> String {
    if messages.is_empty() {
        return opts
            .previous_summary
            .clone()
            .unwrap_or_else(|| EMPTY_TRANSCRIPT_SUMMARY.to_string());
    }

    let instructions = opts.effective_instructions();
    let max_chunk_tokens = max_chunk_tokens.max(1);
    let chunks = split_by_max_tokens(messages, max_chunk_tokens);
    match summarize_chunks_sequentially(
        client,
        &chunks,
        &instructions,
        opts.previous_summary.as_deref(),
        opts,
    )
    .await
    {
        Ok(summary) => return summary,
        Err(err) => warn!(
            error = %err,
            chunks = chunks.len(),
            "Summarization failed, retrying without oversized messages"
        ),
    }

    // A message that alone occupies half the window (after the safety
    // margin) can sink every attempt that includes it; exclude and note it.
    let half_window = context_window_tokens as f64 / 2.0;
    let mut retained: Vec<Message> = Vec::new();
    let mut notes: Vec<String> = Vec::new();
    for msg in messages {
        let tokens = estimate_message_tokens(msg);
        if tokens as f64 * SAFETY_MARGIN > half_window {
            let ktokens = ((tokens as f64) / 1000.0).round().max(1.0) as usize;
            notes.push(format!(
                "[Large {} (~{}K tokens) omitted]",
                msg.role.label(),
                ktokens
            ));
        } else {
            retained.push(msg.clone());
        }
    }

    if !retained.is_empty() {
        let retry_chunks = split_by_max_tokens(&retained, max_chunk_tokens);
        match summarize_chunks_sequentially(
            client,
            &retry_chunks,
            &instructions,
            opts.previous_summary.as_deref(),
            opts,
        )
        .await
        {
            Ok(mut summary) => {
                for note in &notes {
                    summary.push('\n');
                    summary.push_str(note);
                }
                return summary;
            }
            Err(err) => warn!(error = %err, "Retry without oversized messages failed"),
        }
    }

    warn!(
        messages = messages.len(),
        "All summarization attempts failed, emitting placeholder"
    );
    format!("[Summary unavailable: {} messages compacted]", messages.len())
}

/// Multi-stage summarization: short transcripts (or ones that fit a single
/// chunk) go straight to [`summarize_with_fallback`]; longer ones are split
/// into roughly-equal parts that are summarized independently and then
/// merged through the same pipeline. The merge call is not privileged: it
/// degrades exactly like any other summarization call.
pub async fn summarize_in_stages(
    client: &dyn SummarizationClient,
    messages: &[Message],
    max_chunk_tokens: usize,
    context_window_tokens: usize,
    opts: &SummarizeOptions,
) -> String {
    if messages.is_empty() {
        return opts
            .previous_summary
            .clone()
            .unwrap_or_else(|| EMPTY_TRANSCRIPT_SUMMARY.to_string());
    }

    let max_chunk_tokens = max_chunk_tokens.max(1);
    if messages.len() < MIN_MESSAGES_FOR_SPLIT || estimate_tokens(messages) <= max_chunk_tokens
    {
        return summarize_with_fallback(
            client,
            messages,
            max_chunk_tokens,
            context_window_tokens,
            opts,
        )
        .await;
    }

    let chunks = split_by_token_share(messages, SPLIT_PARTS);
    debug!(parts = chunks.len(), "Splitting transcript for staged summarization");

    let mut partials: Vec<String> = Vec::new();
    for chunk in &chunks {
        // Siblings see only their own content: no carry-over between them.
        let sibling_opts = SummarizeOptions {
            previous_summary: None,
            ..opts.clone()
        };
        partials.push(
            summarize_with_fallback(
                client,
                chunk,
                max_chunk_tokens,
                context_window_tokens,
                &sibling_opts,
            )
            .await,
        );
    }
    if partials.len() == 1 {
        return partials.pop().unwrap_or_default();
    }

    let synthetic: Vec<Message> = partials.iter().cloned().map(Message::user).collect();
    let merge_instructions = match &opts.custom_instructions {
        Some(custom) => format!("{}\n{}", custom, MERGE_INSTRUCTIONS),
        None => MERGE_INSTRUCTIONS.to_string(),
    };
    // The merge is not a sibling: the caller's previous summary carries
    // into it so established context survives the split.
    let merge_opts = SummarizeOptions {
        custom_instructions: Some(merge_instructions),
        ..opts.clone()
    };
    summarize_with_fallback(
        client,
        &synthetic,
        max_chunk_tokens,
        context_window_tokens,
        &merge_opts,
    )
    .await
}

/// Top-level summary build: derive the chunk ceiling from the adaptive
/// ratio, clamp the requested summary length to a sane minimum, and run the
/// staged pipeline.
pub async fn build_compaction_summary(
    client: &dyn SummarizationClient,
    messages: &[Message],
    context_window_tokens: usize,
    opts: &SummarizeOptions,
) -> String {
    let ratio = compute_adaptive_chunk_ratio(messages, context_window_tokens);
    let max_chunk_tokens =
        ((context_window_tokens as f64 * ratio).floor() as usize).max(1);
    let opts = SummarizeOptions {
        max_summary_tokens: opts.max_summary_tokens.max(MIN_SUMMARY_TOKENS),
        ..opts.clone()
    };
    debug!(ratio, max_chunk_tokens, "Building compaction summary");
    summarize_in_stages(client, messages, max_chunk_tokens, context_window_tokens, &opts).await
}

/// Prune, check the trigger, and summarize the dropped prefix. Pruning
/// always runs for its statistics; summarization only happens when the
/// trigger fires and the prune actually dropped messages. The caller's
/// transcript is never mutated; applying the result is the caller's job.
pub async fn compact_history_if_needed(
    client: &dyn SummarizationClient,
    messages: &[Message],
    context_window_tokens: usize,
    overrides: Option<&PruningOverrides>,
    trigger_ratio: Option<f64>,
    opts: &SummarizeOptions,
) -> Option<CompactionResult> {
    let prune_result = prune_context_messages(messages, context_window_tokens, overrides);

    if !should_trigger_compaction(messages, context_window_tokens, trigger_ratio)
        || prune_result.dropped_messages.is_empty()
    {
        return None;
    }

    let summary = build_compaction_summary(
        client,
        &prune_result.dropped_messages,
        context_window_tokens,
        opts,
    )
    .await;
    let summary_message = Message::user(format!("[Conversation summary]\n{}", summary));

    Some(CompactionResult {
        summary,
        summary_message,
        prune_result,
    })
}
