use futures::future::try_join_all;
use reqwest::Client;

use super::image::inline_image_url;
use crate::error::RuntimeError;
use crate::protocol::openai::{
    OpenAiContent, OpenAiContentPart, OpenAiFunctionCall, OpenAiImageUrl, OpenAiMessage, OpenAiToolCall,
};
use crate::types::{Content, ContentPart, Message};

/// Convert canonical messages into chat completions messages
///
/// Reasoning traces are dropped. With `vision_base64`, hosted image URLs are
/// downloaded and inlined as `data:` URIs, all messages concurrently.
pub async fn convert_openai_messages(
    client: &Client,
    messages: &[Message],
    vision_base64: bool,
) -> Result<Vec<OpenAiMessage>, RuntimeError> {
    try_join_all(
        messages
            .iter()
            .map(|message| convert_message(client, message, vision_base64)),
    )
    .await
}

async fn convert_message(client: &Client, message: &Message, vision_base64: bool) -> Result<OpenAiMessage, RuntimeError> {
    let content = match &message.content {
        Content::Text(text) => OpenAiContent::Text(text.clone()),
        Content::Parts(parts) => OpenAiContent::Parts(
            try_join_all(parts.iter().map(|part| convert_part(client, part, vision_base64))).await?,
        ),
    };

    let tool_calls = message.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|call| OpenAiToolCall {
                id: call.id.clone(),
                tool_type: call.tool_type.clone(),
                function: OpenAiFunctionCall {
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                },
            })
            .collect()
    });

    Ok(OpenAiMessage {
        role: message.role.as_ref().to_owned(),
        content: Some(content),
        name: message.name.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    })
}

async fn convert_part(client: &Client, part: &ContentPart, vision_base64: bool) -> Result<OpenAiContentPart, RuntimeError> {
    match part {
        ContentPart::Text { text } => Ok(OpenAiContentPart::Text { text: text.clone() }),
        ContentPart::ImageUrl { image_url } => {
            let url = if vision_base64 {
                inline_image_url(client, &image_url.url).await?
            } else {
                image_url.url.clone()
            };

            Ok(OpenAiContentPart::ImageUrl {
                image_url: OpenAiImageUrl {
                    url,
                    detail: image_url.detail.clone(),
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{FunctionCall, Reasoning, Role, ToolCall};

    #[tokio::test]
    async fn reasoning_is_stripped() {
        let mut assistant = Message::assistant("answer");
        assistant.reasoning = Some(Reasoning {
            content: "private thoughts".to_owned(),
            signature: None,
        });

        let converted = convert_openai_messages(&Client::new(), &[Message::user("q"), assistant], false)
            .await
            .unwrap();

        let wire = serde_json::to_value(&converted).unwrap();
        assert_eq!(
            wire,
            json!([
                {"role": "user", "content": "q"},
                {"role": "assistant", "content": "answer"}
            ])
        );
    }

    #[tokio::test]
    async fn parts_and_tool_calls_keep_their_shape() {
        let mut assistant = Message::new(Role::Assistant, "");
        assistant.tool_calls = Some(vec![ToolCall {
            id: "call_1".to_owned(),
            tool_type: "function".to_owned(),
            function: FunctionCall {
                name: "lookup".to_owned(),
                arguments: "{\"q\":\"x\"}".to_owned(),
            },
        }]);
        let user = Message {
            content: Content::Parts(vec![
                ContentPart::text("what is this"),
                ContentPart::image("https://example.com/cat.png"),
            ]),
            ..Message::user("")
        };

        let converted = convert_openai_messages(
            &Client::new(),
            &[user, assistant, Message::tool("call_1", "result")],
            false,
        )
        .await
        .unwrap();

        let wire = serde_json::to_value(&converted).unwrap();
        assert_eq!(
            wire[0]["content"],
            json!([
                {"type": "text", "text": "what is this"},
                {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}}
            ])
        );
        assert_eq!(wire[1]["tool_calls"][0]["function"]["name"], "lookup");
        assert_eq!(wire[2]["tool_call_id"], "call_1");
        assert_eq!(wire[2]["role"], "tool");
    }
}
