use serde_json::{Map, Value, json};

use super::chat::responses_tool;
use super::{OpenAiCompatibleRuntime, ResponsesRouting, should_use_responses};
use crate::context::{convert_openai_messages, convert_response_inputs};
use crate::error::RuntimeError;
use crate::protocol::openai::{ChatCompletion, ChatCompletionRequest, OpenAiToolCall};
use crate::protocol::responses::{ResponseObject, ResponsesRequest};
use crate::types::{
    GenerateObjectOptions, GenerateObjectOutput, GenerateObjectPayload, ObjectSchema, ToolDefinition, ToolInvocation,
};

const DEFAULT_SCHEMA_TOOL_NAME: &str = "structured_output";
const DEFAULT_SCHEMA_TOOL_DESCRIPTION: &str = "Generate structured output according to the provided schema";

impl OpenAiCompatibleRuntime {
    pub(super) async fn generate_object_impl(
        &self,
        payload: GenerateObjectPayload,
        options: GenerateObjectOptions,
    ) -> Result<Option<GenerateObjectOutput>, RuntimeError> {
        if payload.tools.is_none() && payload.schema.is_none() {
            return Err(RuntimeError::InvalidRequest(
                "tools or schema is required".to_owned(),
            ));
        }

        self.dispatch_object(payload, &options).await.map_err(|e| {
            let error = self.classifier.classify_runtime(e);
            tracing::error!(provider = %self.config.provider, error = %error, "generate_object failed");
            error
        })
    }

    async fn dispatch_object(
        &self,
        payload: GenerateObjectPayload,
        options: &GenerateObjectOptions,
    ) -> Result<Option<GenerateObjectOutput>, RuntimeError> {
        let config = &self.config.generate_object;
        let use_responses = should_use_responses(
            &payload.model,
            ResponsesRouting {
                user_api_mode: None,
                response_api: payload.response_api,
                use_response: config.use_response,
                use_response_models: &config.use_response_models,
            },
        );

        if let Some(tools) = payload.tools.clone() {
            return if use_responses {
                self.tools_via_responses(&payload, tools, options).await
            } else {
                self.tools_via_chat(&payload, tools, options).await
            };
        }

        let Some(mut schema) = payload.schema.clone() else {
            return Ok(None);
        };
        if let Some(hook) = &config.handle_schema {
            schema.schema = hook(schema.schema);
        }

        if config.use_tools_calling {
            return self.schema_via_tool(&payload, schema, options).await;
        }

        if use_responses {
            self.schema_via_responses(&payload, &schema, options).await
        } else {
            self.schema_via_chat(&payload, &schema, options).await
        }
    }

    async fn chat_request(
        &self,
        payload: &GenerateObjectPayload,
        options: &GenerateObjectOptions,
    ) -> Result<ChatCompletionRequest, RuntimeError> {
        Ok(ChatCompletionRequest {
            model: payload.model.clone(),
            messages: convert_openai_messages(self.transport.client(), &payload.messages, self.vision_base64).await?,
            user: options.user.clone(),
            ..ChatCompletionRequest::default()
        })
    }

    async fn responses_request(
        &self,
        payload: &GenerateObjectPayload,
        options: &GenerateObjectOptions,
    ) -> Result<ResponsesRequest, RuntimeError> {
        Ok(ResponsesRequest {
            model: payload.model.clone(),
            input: convert_response_inputs(self.transport.client(), &payload.messages, self.vision_base64).await?,
            user: options.user.clone(),
            ..ResponsesRequest::default()
        })
    }

    async fn complete(
        &self,
        request: &ChatCompletionRequest,
        options: &GenerateObjectOptions,
    ) -> Result<ChatCompletion, RuntimeError> {
        Ok(self
            .transport
            .post_json("chat/completions", request, &options.headers, options.signal.as_ref())
            .await?)
    }

    async fn respond(
        &self,
        request: &ResponsesRequest,
        options: &GenerateObjectOptions,
    ) -> Result<ResponseObject, RuntimeError> {
        Ok(self
            .transport
            .post_json("responses", request, &options.headers, options.signal.as_ref())
            .await?)
    }

    async fn tools_via_chat(
        &self,
        payload: &GenerateObjectPayload,
        tools: Vec<ToolDefinition>,
        options: &GenerateObjectOptions,
    ) -> Result<Option<GenerateObjectOutput>, RuntimeError> {
        let request = ChatCompletionRequest {
            tools: Some(tools),
            tool_choice: Some(json!("required")),
            ..self.chat_request(payload, options).await?
        };

        let completion = self.complete(&request, options).await?;
        let calls = first_tool_calls(&completion);

        Ok(parse_invocations(
            calls
                .iter()
                .map(|call| (call.function.name.as_str(), call.function.arguments.as_str())),
        ))
    }

    async fn tools_via_responses(
        &self,
        payload: &GenerateObjectPayload,
        tools: Vec<ToolDefinition>,
        options: &GenerateObjectOptions,
    ) -> Result<Option<GenerateObjectOutput>, RuntimeError> {
        let request = ResponsesRequest {
            tools: Some(tools.into_iter().map(responses_tool).collect()),
            tool_choice: Some(json!("required")),
            ..self.responses_request(payload, options).await?
        };

        let response = self.respond(&request, options).await?;

        Ok(parse_invocations(
            response
                .function_calls()
                .map(|(_, name, arguments)| (name, arguments)),
        ))
    }

    async fn schema_via_tool(
        &self,
        payload: &GenerateObjectPayload,
        schema: ObjectSchema,
        options: &GenerateObjectOptions,
    ) -> Result<Option<GenerateObjectOutput>, RuntimeError> {
        let name = schema
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_SCHEMA_TOOL_NAME.to_owned());
        let description = schema
            .description
            .unwrap_or_else(|| DEFAULT_SCHEMA_TOOL_DESCRIPTION.to_owned());
        let tool = ToolDefinition::function(&name, Some(description), Some(schema.schema));

        let request = ChatCompletionRequest {
            tools: Some(vec![tool]),
            tool_choice: Some(json!({"type": "function", "function": {"name": name}})),
            ..self.chat_request(payload, options).await?
        };

        let completion = self.complete(&request, options).await?;
        let calls = first_tool_calls(&completion);

        let Some(call) = calls.first() else {
            tracing::warn!(provider = %self.config.provider, tool = %name, "model returned no tool call for the schema tool");
            return Ok(None);
        };
        if calls.len() > 1 {
            tracing::warn!(provider = %self.config.provider, count = calls.len(), "model returned several tool calls, using the first");
        }

        Ok(parse_object(&call.function.arguments))
    }

    async fn schema_via_responses(
        &self,
        payload: &GenerateObjectPayload,
        schema: &ObjectSchema,
        options: &GenerateObjectOptions,
    ) -> Result<Option<GenerateObjectOutput>, RuntimeError> {
        let request = ResponsesRequest {
            text: Some(json!({ "format": json_schema_format(schema) })),
            ..self.responses_request(payload, options).await?
        };

        let response = self.respond(&request, options).await?;
        Ok(parse_object(&response.output_text()))
    }

    async fn schema_via_chat(
        &self,
        payload: &GenerateObjectPayload,
        schema: &ObjectSchema,
        options: &GenerateObjectOptions,
    ) -> Result<Option<GenerateObjectOutput>, RuntimeError> {
        let request = ChatCompletionRequest {
            response_format: Some(json!({"type": "json_schema", "json_schema": schema})),
            ..self.chat_request(payload, options).await?
        };

        let completion = self.complete(&request, options).await?;
        let content = completion
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref());

        let Some(content) = content else {
            tracing::warn!(provider = %self.config.provider, "structured output response had no content");
            return Ok(None);
        };

        Ok(parse_object(content))
    }
}

/// Responses API `text.format` for a schema; the schema's own fields win
fn json_schema_format(schema: &ObjectSchema) -> Value {
    let mut format = Map::new();
    format.insert("strict".to_owned(), Value::Bool(true));
    format.insert("type".to_owned(), json!("json_schema"));

    if let Ok(Value::Object(fields)) = serde_json::to_value(schema) {
        format.extend(fields);
    }
    Value::Object(format)
}

fn first_tool_calls(completion: &ChatCompletion) -> &[OpenAiToolCall] {
    completion
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.as_deref())
        .unwrap_or_default()
}

fn parse_object(text: &str) -> Option<GenerateObjectOutput> {
    match serde_json::from_str(text) {
        Ok(value) => Some(GenerateObjectOutput::Object(value)),
        Err(e) => {
            tracing::error!(error = %e, text = %text, "failed to parse structured output");
            None
        }
    }
}

/// Parse every invocation's arguments; any failure discards the whole set
fn parse_invocations<'a>(calls: impl Iterator<Item = (&'a str, &'a str)>) -> Option<GenerateObjectOutput> {
    let mut invocations = Vec::new();

    for (name, arguments) in calls {
        match serde_json::from_str(arguments) {
            Ok(arguments) => invocations.push(ToolInvocation {
                name: name.to_owned(),
                arguments,
            }),
            Err(e) => {
                tracing::error!(error = %e, tool = %name, arguments = %arguments, "failed to parse tool call arguments");
                return None;
            }
        }
    }

    Some(GenerateObjectOutput::ToolCalls(invocations))
}
