//! Complete responses replayed as stream frames

use serde_json::{Value, json};

use super::protocol::convert_responses_usage;
use crate::protocol::openai::ChatCompletion;
use crate::protocol::responses::{OutputItem, ResponseObject};
use crate::types::{StreamChunk, StreamEvent, ToolCallChunk, ToolCallFunction, function_type};

/// Replay a chat completion as chunk-shaped frames for [`super::ChatChunkTransformer`]
///
/// Emits reasoning, then content with tool calls, then usage, then the
/// finish reason, each as its own frame. A completion with no choices
/// replays only its usage, if any, and never synthesizes a stop.
pub fn completion_to_frames(completion: &ChatCompletion) -> Vec<Value> {
    let id = &completion.id;
    let mut frames = Vec::new();

    let Some(choice) = completion.choices.first() else {
        if let Some(usage) = &completion.usage {
            frames.push(json!({ "id": id, "choices": [], "usage": usage }));
        }
        return frames;
    };
    let message = &choice.message;
    let role = message.role.as_deref().unwrap_or("assistant");

    if let Some(reasoning) = message
        .reasoning_content
        .as_deref()
        .or(message.reasoning.as_deref())
        .filter(|r| !r.is_empty())
    {
        frames.push(json!({
            "id": id,
            "choices": [{ "index": choice.index, "delta": { "role": role, "reasoning_content": reasoning } }],
        }));
    }

    let tool_calls: Option<Vec<Value>> = message.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .enumerate()
            .map(|(index, call)| {
                json!({
                    "index": index,
                    "id": call.id,
                    "type": call.tool_type,
                    "function": { "name": call.function.name, "arguments": call.function.arguments },
                })
            })
            .collect()
    });

    if message.content.is_some() || tool_calls.is_some() {
        let mut delta = json!({ "role": role, "content": message.content });
        if let Some(calls) = tool_calls {
            delta["tool_calls"] = Value::Array(calls);
        }
        frames.push(json!({ "id": id, "choices": [{ "index": choice.index, "delta": delta }] }));
    }

    if let Some(usage) = &completion.usage {
        frames.push(json!({ "id": id, "choices": [], "usage": usage }));
    }

    frames.push(json!({
        "id": id,
        "choices": [{
            "index": choice.index,
            "delta": {},
            "finish_reason": choice.finish_reason.as_deref().unwrap_or("stop"),
        }],
    }));

    frames
}

/// Canonical chunks for a complete responses API object
pub fn response_to_chunks(response: &ResponseObject) -> Vec<StreamChunk> {
    let id = response.id.as_str();
    let mut chunks = Vec::new();

    let reasoning: String = response
        .output
        .iter()
        .filter_map(|item| match item {
            OutputItem::Reasoning { summary, .. } => Some(summary),
            _ => None,
        })
        .flatten()
        .map(|s| s.text.as_str())
        .collect();
    if !reasoning.is_empty() {
        chunks.push(StreamChunk::new(id, StreamEvent::Reasoning(reasoning)));
    }

    let text = response.output_text();
    if !text.is_empty() {
        chunks.push(StreamChunk::new(id, StreamEvent::Text(text)));
    }

    let calls: Vec<ToolCallChunk> = response
        .function_calls()
        .zip(0..)
        .map(|((call_id, name, arguments), index)| ToolCallChunk {
            function: ToolCallFunction {
                arguments: arguments.to_owned(),
                name: Some(name.to_owned()),
            },
            id: call_id.to_owned(),
            index,
            tool_type: function_type(),
        })
        .collect();
    if !calls.is_empty() {
        chunks.push(StreamChunk::new(id, StreamEvent::ToolCalls(calls)));
    }

    if let Some(usage) = &response.usage {
        chunks.push(StreamChunk::new(id, StreamEvent::Usage(convert_responses_usage(usage))));
    }

    chunks.push(StreamChunk::new(id, StreamEvent::Stop("stop".to_owned())));
    chunks
}
