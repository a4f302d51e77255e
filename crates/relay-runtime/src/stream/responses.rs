use std::collections::HashMap;

use serde_json::Value;

use super::protocol::convert_responses_usage;
use super::{ChunkDecoder, VendorError};
use crate::protocol::responses::{OutputItem, ResponseStreamEvent};
use crate::types::{StreamChunk, StreamEvent, ToolCallChunk, ToolCallFunction, function_type};

/// Decoder for responses API stream events
#[derive(Debug, Default)]
pub struct ResponsesEventTransformer {
    response_id: String,
    /// `item_id` → (tool call index, `call_id`)
    tool_calls: HashMap<String, (u32, String)>,
    next_index: u32,
}

impl ChunkDecoder for ResponsesEventTransformer {
    fn decode(&mut self, raw: Value) -> Result<Vec<StreamChunk>, VendorError> {
        match raw.get("type").and_then(Value::as_str) {
            Some("error") => return Err(VendorError(raw)),
            Some("response.failed") => {
                let error = raw
                    .pointer("/response/error")
                    .filter(|e| !e.is_null())
                    .cloned()
                    .unwrap_or_else(|| raw.clone());
                return Err(VendorError(error));
            }
            _ => {}
        }

        let event: ResponseStreamEvent = match serde_json::from_value(raw.clone()) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "passing through unrecognized responses event");
                return Ok(vec![self.chunk(StreamEvent::Data(raw))]);
            }
        };

        let chunks = match event {
            ResponseStreamEvent::Created { response } => {
                self.response_id = response.id;
                vec![self.chunk(StreamEvent::Data(raw))]
            }
            ResponseStreamEvent::OutputItemAdded {
                item: OutputItem::FunctionCall {
                    id,
                    call_id,
                    name,
                    arguments,
                },
                ..
            } => {
                let index = self.next_index;
                self.next_index += 1;
                self.tool_calls.insert(id, (index, call_id.clone()));

                vec![self.chunk(StreamEvent::ToolCalls(vec![ToolCallChunk {
                    function: ToolCallFunction {
                        arguments,
                        name: Some(name),
                    },
                    id: call_id,
                    index,
                    tool_type: function_type(),
                }]))]
            }
            ResponseStreamEvent::FunctionCallArgumentsDelta { item_id, delta, .. } => {
                match self.tool_calls.get(&item_id).cloned() {
                    Some((index, call_id)) => vec![self.chunk(StreamEvent::ToolCalls(vec![ToolCallChunk {
                        function: ToolCallFunction {
                            arguments: delta,
                            name: None,
                        },
                        id: call_id,
                        index,
                        tool_type: function_type(),
                    }]))],
                    None => vec![self.chunk(StreamEvent::Data(raw))],
                }
            }
            ResponseStreamEvent::OutputTextDelta { delta, .. } => {
                vec![self.chunk(StreamEvent::Text(delta))]
            }
            ResponseStreamEvent::ReasoningSummaryTextDelta { delta, .. } => {
                vec![self.chunk(StreamEvent::Reasoning(delta))]
            }
            ResponseStreamEvent::Completed { response } => {
                let mut chunks = Vec::with_capacity(2);
                if let Some(usage) = &response.usage {
                    chunks.push(self.chunk(StreamEvent::Usage(convert_responses_usage(usage))));
                }
                chunks.push(self.chunk(StreamEvent::Stop("stop".to_owned())));
                chunks
            }
            ResponseStreamEvent::OutputItemAdded { .. } | ResponseStreamEvent::Other => {
                vec![self.chunk(StreamEvent::Data(raw))]
            }
        };

        Ok(chunks)
    }
}

impl ResponsesEventTransformer {
    fn chunk(&self, event: StreamEvent) -> StreamChunk {
        StreamChunk::new(self.response_id.clone(), event)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn full_event_sequence() {
        let mut t = ResponsesEventTransformer::default();
        let frames = [
            json!({"type": "response.created", "response": {"id": "resp_1", "output": []}}),
            json!({"type": "response.reasoning_summary_text.delta", "item_id": "rs_1", "delta": "consider"}),
            json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "Hi"}),
            json!({"type": "response.output_item.added", "output_index": 2, "item": {
                "type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "lookup", "arguments": ""
            }}),
            json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "output_index": 2, "delta": "{}"}),
            json!({"type": "response.completed", "response": {"id": "resp_1", "output": [],
                "usage": {"input_tokens": 5, "output_tokens": 2, "total_tokens": 7}}}),
        ];

        let chunks: Vec<StreamChunk> = frames
            .into_iter()
            .flat_map(|frame| t.decode(frame).unwrap())
            .collect();
        let kinds: Vec<_> = chunks.iter().map(StreamChunk::kind).collect();

        assert_eq!(
            kinds,
            ["data", "reasoning", "text", "tool_calls", "tool_calls", "usage", "stop"]
        );
        assert!(chunks.iter().all(|c| c.id == "resp_1"));

        let StreamEvent::ToolCalls(calls) = &chunks[4].event else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].index, 0);
        assert_eq!(calls[0].function.arguments, "{}");
    }

    #[test]
    fn unknown_events_become_data() {
        let mut t = ResponsesEventTransformer::default();
        let raw = json!({"type": "response.in_progress", "sequence_number": 3});
        let chunks = t.decode(raw.clone()).unwrap();
        assert_eq!(chunks[0].event, StreamEvent::Data(raw));
    }

    #[test]
    fn failed_response_is_vendor_error() {
        let mut t = ResponsesEventTransformer::default();
        let raw = json!({"type": "response.failed", "response": {"id": "r", "error": {"code": "server_error", "message": "boom"}}});
        let Err(VendorError(error)) = t.decode(raw) else {
            panic!("expected vendor error");
        };
        assert_eq!(error["message"], "boom");
    }
}
