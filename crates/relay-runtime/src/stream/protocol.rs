//! Shared pieces of the canonical stream protocol

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::protocol::openai::OpenAiUsage;
use crate::protocol::responses::ResponsesUsage;
use crate::types::{ModelSpeed, ModelUsage, StreamChunk, StreamEvent};

/// Id of the synthetic speed chunk
pub const SPEED_CHUNK_ID: &str = "output_speed";

/// Parse the payload of one SSE `data:` line
///
/// Returns `None` for the `[DONE]` sentinel, blank payloads and anything that
/// is not JSON.
pub fn parse_sse_data(data: &str) -> Option<Value> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    match serde_json::from_str(data) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, data = %data, "skipping unparseable SSE data");
            None
        }
    }
}

/// Id for a tool call whose upstream chunk carried none
pub fn generate_tool_call_id(index: u32, name: Option<&str>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{index}_{}", name.unwrap_or("tool"), &suffix[..8])
}

/// Normalize chat completions usage
pub fn convert_usage(usage: &OpenAiUsage) -> ModelUsage {
    let cached = usage.prompt_tokens_details.as_ref().and_then(|d| d.cached_tokens);
    let reasoning = usage
        .completion_tokens_details
        .as_ref()
        .and_then(|d| d.reasoning_tokens);

    build_usage(
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.total_tokens,
        cached,
        reasoning,
    )
}

/// Normalize responses API usage
pub fn convert_responses_usage(usage: &ResponsesUsage) -> ModelUsage {
    let cached = usage.input_tokens_details.as_ref().and_then(|d| d.cached_tokens);
    let reasoning = usage.output_tokens_details.as_ref().and_then(|d| d.reasoning_tokens);

    build_usage(
        usage.input_tokens,
        usage.output_tokens,
        usage.total_tokens,
        cached,
        reasoning,
    )
}

fn build_usage(input: u64, output: u64, total: u64, cached: Option<u64>, reasoning: Option<u64>) -> ModelUsage {
    let cached = cached.filter(|c| *c > 0);
    let reasoning = reasoning.filter(|r| *r > 0);

    ModelUsage {
        input_cached_tokens: cached,
        input_cache_miss_tokens: cached.map(|c| input.saturating_sub(c)),
        input_text_tokens: input,
        output_reasoning_tokens: reasoning,
        output_text_tokens: output.saturating_sub(reasoning.unwrap_or(0)),
        total_input_tokens: input,
        total_output_tokens: output,
        total_tokens: if total == 0 { input + output } else { total },
    }
}

/// How the speed chunk measures time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedMode {
    /// Time to first token from the first output chunk, throughput over the output window
    Incremental,
    /// Whole response arrived at once: both figures use total elapsed time
    Total,
}

/// Emits a speed chunk after every usage chunk
#[derive(Debug)]
pub struct TokenSpeedCalculator {
    input_start_at: Instant,
    output_start_at: Option<Instant>,
    mode: SpeedMode,
}

impl TokenSpeedCalculator {
    pub const fn new(input_start_at: Instant, mode: SpeedMode) -> Self {
        Self {
            input_start_at,
            output_start_at: None,
            mode,
        }
    }

    /// Observe a chunk on its way out, returning the speed chunk to emit after it
    pub fn observe(&mut self, chunk: &StreamChunk) -> Option<StreamChunk> {
        match &chunk.event {
            StreamEvent::Text(_) | StreamEvent::Reasoning(_) | StreamEvent::ToolCalls(_) => {
                self.output_start_at.get_or_insert_with(Instant::now);
                None
            }
            StreamEvent::Usage(usage) => Some(StreamChunk::new(
                SPEED_CHUNK_ID,
                StreamEvent::Speed(self.speed(usage, Instant::now())),
            )),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn speed(&self, usage: &ModelUsage, now: Instant) -> ModelSpeed {
        let total = now.saturating_duration_since(self.input_start_at);
        let (ttft, window) = match (self.mode, self.output_start_at) {
            (SpeedMode::Incremental, Some(first)) => (
                first.saturating_duration_since(self.input_start_at),
                now.saturating_duration_since(first),
            ),
            _ => (total, total),
        };

        let output_tokens = if usage.total_output_tokens > 0 {
            usage.total_output_tokens
        } else {
            usage.output_text_tokens + usage.output_reasoning_tokens.unwrap_or(0)
        };

        let seconds = window.max(Duration::from_millis(1)).as_secs_f64();

        ModelSpeed {
            tps: output_tokens as f64 / seconds,
            ttft: u64::try_from(ttft.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
