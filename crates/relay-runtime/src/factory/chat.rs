use std::time::Instant;

use bytes::Bytes;
use serde_json::{Map, Value};

use super::{ChatResponse, OpenAiCompatibleRuntime, ResponsesRouting, should_use_responses};
use crate::context::{convert_openai_messages, convert_response_inputs};
use crate::error::RuntimeError;
use crate::protocol::openai::{ChatCompletion, ChatCompletionRequest, StreamOptions};
use crate::protocol::responses::{ResponseObject, ResponsesRequest, ResponsesTool};
use crate::stream::{
    ByteStream, ChatChunkTransformer, EventStream, ResponsesEventTransformer, completion_to_frames, fan_out,
    normalize_chunks, normalize_frames, normalize_sse, response_to_chunks,
};
use crate::transport::{body_stream, read_json};
use crate::types::{ApiMode, ChatOptions, ChatPayload, ToolDefinition};

impl OpenAiCompatibleRuntime {
    pub(super) async fn chat_impl(&self, payload: ChatPayload, options: ChatOptions) -> Result<ChatResponse, RuntimeError> {
        let input_start_at = Instant::now();

        let events = self
            .dispatch_chat(payload, &options, input_start_at)
            .await
            .map_err(|e| {
                let error = self.classifier.classify_runtime(e);
                tracing::error!(provider = %self.config.provider, error = %error, "chat request failed");
                error
            })?;

        Ok(ChatResponse::new(options.response_headers, events))
    }

    async fn dispatch_chat(
        &self,
        mut payload: ChatPayload,
        options: &ChatOptions,
        input_start_at: Instant,
    ) -> Result<EventStream, RuntimeError> {
        let hooks = &self.config.chat_completion;

        let routing = ResponsesRouting {
            user_api_mode: payload.api_mode,
            use_response: hooks.use_response,
            use_response_models: &hooks.use_response_models,
            ..ResponsesRouting::default()
        };
        if should_use_responses(&payload.model, routing) {
            payload.api_mode = Some(ApiMode::Responses);
        }

        let payload = match &hooks.handle_payload {
            Some(hook) => hook(payload),
            None => payload,
        };

        if payload.api_mode == Some(ApiMode::Responses) {
            return self.responses_chat(payload, options, input_start_at).await;
        }

        let stream = payload.stream != Some(false);
        let messages = convert_openai_messages(self.transport.client(), &payload.messages, self.vision_base64).await?;

        let request = ChatCompletionRequest {
            model: payload.model,
            messages,
            temperature: payload.temperature,
            top_p: payload.top_p,
            frequency_penalty: payload.frequency_penalty,
            presence_penalty: payload.presence_penalty,
            max_tokens: payload.max_tokens,
            tools: payload.tools,
            reasoning_effort: payload.reasoning_effort,
            stream: Some(stream),
            stream_options: (stream && !hooks.exclude_usage).then_some(StreamOptions { include_usage: true }),
            user: if hooks.no_user_id { None } else { options.user.clone() },
            extra: payload.extra,
            ..ChatCompletionRequest::default()
        };

        let debug = self.debug_chat_completion();
        if debug {
            tracing::debug!(provider = %self.config.provider, payload = %serde_json::to_string(&request).unwrap_or_default(), "chat completions request");
        }

        let response = self
            .transport
            .post("chat/completions", &request, &options.headers, options.signal.as_ref())
            .await?;
        let settings = self.stream_settings(input_start_at, options.callbacks.clone());

        if stream {
            let body = fan_out(
                body_stream(response, options.signal.clone()),
                debug,
                &self.config.provider,
            );
            return Ok(match &hooks.handle_stream {
                Some(hook) => hook(body, settings),
                None => normalize_sse(body, ChatChunkTransformer::default(), settings),
            });
        }

        let completion: ChatCompletion = read_json(response, options.signal.as_ref()).await?;
        if debug {
            tracing::debug!(provider = %self.config.provider, response = %serde_json::to_string(&completion).unwrap_or_default(), "chat completion");
        }

        let frames = match &hooks.handle_transform_response_to_stream {
            Some(hook) => hook(&completion),
            None => completion_to_frames(&completion),
        };

        Ok(match &hooks.handle_stream {
            Some(hook) => hook(frames_to_body(&frames), settings),
            None => normalize_frames(frames, ChatChunkTransformer::default(), settings),
        })
    }

    async fn responses_chat(
        &self,
        payload: ChatPayload,
        options: &ChatOptions,
        input_start_at: Instant,
    ) -> Result<EventStream, RuntimeError> {
        let stream = payload.stream != Some(false);
        let payload = match &self.config.responses.handle_payload {
            Some(hook) => hook(payload),
            None => payload,
        };

        let input = convert_response_inputs(self.transport.client(), &payload.messages, self.vision_base64).await?;

        let mut extra = payload.extra;
        let reasoning = merge_reasoning(extra.remove("reasoning"), payload.reasoning_effort);

        let request = ResponsesRequest {
            model: payload.model,
            input,
            temperature: payload.temperature,
            top_p: payload.top_p,
            max_output_tokens: payload.max_tokens,
            reasoning,
            tools: payload
                .tools
                .map(|tools| tools.into_iter().map(responses_tool).collect()),
            stream: stream.then_some(true),
            store: false,
            extra,
            ..ResponsesRequest::default()
        };

        let debug = self.debug_responses();
        if debug {
            tracing::debug!(provider = %self.config.provider, payload = %serde_json::to_string(&request).unwrap_or_default(), "responses request");
        }

        let response = self
            .transport
            .post("responses", &request, &options.headers, options.signal.as_ref())
            .await?;
        let settings = self.stream_settings(input_start_at, options.callbacks.clone());

        if stream {
            let body = fan_out(
                body_stream(response, options.signal.clone()),
                debug,
                &self.config.provider,
            );
            return Ok(normalize_sse(body, ResponsesEventTransformer::default(), settings));
        }

        let response: ResponseObject = read_json(response, options.signal.as_ref()).await?;
        if debug {
            tracing::debug!(provider = %self.config.provider, response = %serde_json::to_string(&response).unwrap_or_default(), "responses response");
        }

        Ok(normalize_chunks(response_to_chunks(&response), settings))
    }
}

/// Flatten a chat tool into the responses API tool shape
pub(super) fn responses_tool(tool: ToolDefinition) -> ResponsesTool {
    ResponsesTool {
        tool_type: tool.tool_type,
        name: tool.function.name,
        description: tool.function.description,
        parameters: tool.function.parameters,
    }
}

/// `reasoning` object with `effort` folded in, if either is present
fn merge_reasoning(reasoning: Option<Value>, effort: Option<String>) -> Option<Value> {
    if reasoning.is_none() && effort.is_none() {
        return None;
    }

    let mut merged = match reasoning {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    if let Some(effort) = effort {
        merged.insert("effort".to_owned(), Value::String(effort));
    }
    Some(Value::Object(merged))
}

/// Re-encode synthesized frames as an SSE body for custom stream hooks
fn frames_to_body(frames: &[Value]) -> ByteStream {
    let encoded: Vec<_> = frames
        .iter()
        .map(|frame| Ok(Bytes::from(format!("data: {frame}\n\n"))))
        .collect();
    Box::pin(futures_util::stream::iter(encoded))
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;
    use serde_json::json;

    use super::*;

    #[test]
    fn reasoning_effort_is_merged() {
        assert_eq!(merge_reasoning(None, None), None);
        assert_eq!(
            merge_reasoning(None, Some("high".to_owned())),
            Some(json!({"effort": "high"}))
        );
        assert_eq!(
            merge_reasoning(Some(json!({"summary": "auto"})), Some("low".to_owned())),
            Some(json!({"summary": "auto", "effort": "low"}))
        );
        assert_eq!(
            merge_reasoning(Some(json!({"summary": "auto"})), None),
            Some(json!({"summary": "auto"}))
        );
    }

    #[test]
    fn tools_are_flattened() {
        let tool = ToolDefinition::function("lookup", Some("find things".to_owned()), Some(json!({"type": "object"})));
        let wire = serde_json::to_value(responses_tool(tool)).unwrap();

        assert_eq!(
            wire,
            json!({
                "type": "function",
                "name": "lookup",
                "description": "find things",
                "parameters": {"type": "object"}
            })
        );
    }

    #[tokio::test]
    async fn frames_become_sse_body() {
        let body: Vec<Bytes> = frames_to_body(&[json!({"a": 1})]).try_collect().await.unwrap();
        assert_eq!(body, [Bytes::from("data: {\"a\":1}\n\n")]);
    }
}
