use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One canonical unit of streamed model output
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    /// Upstream response id, or a synthetic id such as `output_speed`
    pub id: String,
    pub event: StreamEvent,
}

impl StreamChunk {
    pub fn new(id: impl Into<String>, event: StreamEvent) -> Self {
        Self { id: id.into(), event }
    }

    /// SSE `event:` name
    pub const fn kind(&self) -> &'static str {
        self.event.kind()
    }

    /// Encode as one SSE frame: `id`, `event` and `data` lines
    pub fn to_sse(&self) -> String {
        format!("id: {}\nevent: {}\ndata: {}\n\n", self.id, self.kind(), self.event.data())
    }
}

/// Canonical stream event, independent of vendor wire format
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Text(String),
    Reasoning(String),
    ToolCalls(Vec<ToolCallChunk>),
    Usage(ModelUsage),
    Speed(ModelSpeed),
    /// Finish reason; always the last event of a completed stream
    Stop(String),
    /// Opaque passthrough of a chunk with nothing actionable in it
    Data(Value),
}

impl StreamEvent {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Reasoning(_) => "reasoning",
            Self::ToolCalls(_) => "tool_calls",
            Self::Usage(_) => "usage",
            Self::Speed(_) => "speed",
            Self::Stop(_) => "stop",
            Self::Data(_) => "data",
        }
    }

    /// JSON payload of the `data:` line
    pub fn data(&self) -> Value {
        let encoded = match self {
            Self::Text(text) | Self::Reasoning(text) | Self::Stop(text) => serde_json::to_value(text),
            Self::ToolCalls(calls) => serde_json::to_value(calls),
            Self::Usage(usage) => serde_json::to_value(usage),
            Self::Speed(speed) => serde_json::to_value(speed),
            Self::Data(value) => return value.clone(),
        };

        // Plain data structs always serialize
        encoded.unwrap_or(Value::Null)
    }
}

/// Incremental tool call fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallChunk {
    pub function: ToolCallFunction,
    pub id: String,
    pub index: u32,
    #[serde(rename = "type")]
    pub tool_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub arguments: String,
    pub name: Option<String>,
}

/// Token accounting reported at the end of a response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cached_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cache_miss_tokens: Option<u64>,
    pub input_text_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_reasoning_tokens: Option<u64>,
    pub output_text_tokens: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
}

/// Throughput figures derived from usage and wall-clock timing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelSpeed {
    /// Output tokens per second
    pub tps: f64,
    /// Time to first token, in milliseconds
    pub ttft: u64,
}
