use std::collections::HashMap;

use serde_json::Value;

use super::protocol::{convert_usage, generate_tool_call_id};
use super::{ChunkDecoder, VendorError};
use crate::protocol::openai::{ChatCompletionChunk, ChunkToolCall};
use crate::types::{StreamChunk, StreamEvent, ToolCallChunk, ToolCallFunction, function_type};

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Decoder for chat completions stream chunks
#[derive(Debug, Default)]
pub struct ChatChunkTransformer {
    /// Tool call id per index, for vendors that only send the id once
    tool_ids: HashMap<u32, String>,
    /// Inside a `<think>` block spread over several content deltas
    thinking_in_content: bool,
}

impl ChunkDecoder for ChatChunkTransformer {
    fn decode(&mut self, raw: Value) -> Result<Vec<StreamChunk>, VendorError> {
        if raw.get("error").is_some_and(|e| !e.is_null()) {
            return Err(VendorError(raw));
        }

        let chunk: ChatCompletionChunk = match serde_json::from_value(raw.clone()) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "passing through unrecognized chunk");
                let id = raw.get("id").and_then(Value::as_str).unwrap_or_default().to_owned();
                return Ok(vec![StreamChunk::new(id, StreamEvent::Data(raw))]);
            }
        };

        let id = chunk.id.as_str();

        let Some(choice) = chunk.choices.first() else {
            // Usage-only trailer, or metadata such as prompt filter results
            let event = match &chunk.usage {
                Some(usage) => StreamEvent::Usage(convert_usage(usage)),
                None => StreamEvent::Data(raw),
            };
            return Ok(vec![StreamChunk::new(id, event)]);
        };

        let delta = &choice.delta;
        let mut out = Vec::new();

        if let Some(reasoning) = delta
            .reasoning_content
            .as_deref()
            .or(delta.reasoning.as_deref())
            .filter(|r| !r.is_empty())
        {
            out.push(StreamChunk::new(id, StreamEvent::Reasoning(reasoning.to_owned())));
        }

        if let Some(content) = delta.content.as_deref().filter(|c| !c.is_empty()) {
            self.split_content(id, content, &mut out);
        }

        if let Some(calls) = delta.tool_calls.as_deref().filter(|c| !c.is_empty()) {
            let calls = self.tool_calls(calls);
            out.push(StreamChunk::new(id, StreamEvent::ToolCalls(calls)));
        }

        if let Some(usage) = &chunk.usage {
            out.push(StreamChunk::new(id, StreamEvent::Usage(convert_usage(usage))));
        }

        if let Some(reason) = &choice.finish_reason {
            out.push(StreamChunk::new(id, StreamEvent::Stop(reason.clone())));
            return Ok(out);
        }

        if out.is_empty() {
            let event = if delta.content.is_some() {
                StreamEvent::Text(String::new())
            } else {
                StreamEvent::Data(raw)
            };
            out.push(StreamChunk::new(id, event));
        }

        Ok(out)
    }
}

impl ChatChunkTransformer {
    /// Split content on `<think>` tags, routing tagged spans to reasoning
    fn split_content(&mut self, id: &str, mut content: &str, out: &mut Vec<StreamChunk>) {
        loop {
            let tag = if self.thinking_in_content { THINK_CLOSE } else { THINK_OPEN };
            let Some(pos) = content.find(tag) else {
                self.push_segment(id, content, out);
                return;
            };

            self.push_segment(id, &content[..pos], out);
            self.thinking_in_content = !self.thinking_in_content;
            content = &content[pos + tag.len()..];
        }
    }

    fn push_segment(&self, id: &str, segment: &str, out: &mut Vec<StreamChunk>) {
        if segment.is_empty() {
            return;
        }

        let event = if self.thinking_in_content {
            StreamEvent::Reasoning(segment.to_owned())
        } else {
            StreamEvent::Text(segment.to_owned())
        };
        out.push(StreamChunk::new(id, event));
    }

    fn tool_calls(&mut self, calls: &[ChunkToolCall]) -> Vec<ToolCallChunk> {
        let mut converted = Vec::with_capacity(calls.len());

        for (position, call) in calls.iter().enumerate() {
            let index = call
                .index
                .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX));
            let name = call.function.as_ref().and_then(|f| f.name.clone());

            let id = match call.id.as_deref().filter(|id| !id.is_empty()) {
                Some(id) => {
                    self.tool_ids.insert(index, id.to_owned());
                    id.to_owned()
                }
                None => self
                    .tool_ids
                    .entry(index)
                    .or_insert_with(|| generate_tool_call_id(index, name.as_deref()))
                    .clone(),
            };

            converted.push(ToolCallChunk {
                function: ToolCallFunction {
                    arguments: call
                        .function
                        .as_ref()
                        .and_then(|f| f.arguments.clone())
                        .unwrap_or_default(),
                    name,
                },
                id,
                index,
                tool_type: call.tool_type.clone().unwrap_or_else(function_type),
            });
        }

        converted
    }
}
