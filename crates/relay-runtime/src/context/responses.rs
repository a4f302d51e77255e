use futures::future::try_join_all;
use reqwest::Client;

use super::image::inline_image_url;
use crate::error::RuntimeError;
use crate::protocol::responses::{InputContent, InputItem, InputPart};
use crate::types::{Content, ContentPart, Message, Role};

/// Convert canonical messages into responses API input items
///
/// Tool results become `function_call_output` items and assistant tool calls
/// become `function_call` items following the assistant's text, if any.
pub async fn convert_response_inputs(
    client: &Client,
    messages: &[Message],
    vision_base64: bool,
) -> Result<Vec<InputItem>, RuntimeError> {
    let converted = try_join_all(
        messages
            .iter()
            .map(|message| convert_message(client, message, vision_base64)),
    )
    .await?;

    Ok(converted.into_iter().flatten().collect())
}

async fn convert_message(client: &Client, message: &Message, vision_base64: bool) -> Result<Vec<InputItem>, RuntimeError> {
    if message.role == Role::Tool {
        return Ok(vec![InputItem::FunctionCallOutput {
            call_id: message.tool_call_id.clone().unwrap_or_default(),
            output: message.content.text(),
        }]);
    }

    let mut items = Vec::new();
    let tool_calls = message.tool_calls.as_deref().unwrap_or_default();

    // An assistant turn that only carries tool calls has no message item
    if tool_calls.is_empty() || !message.content.text().is_empty() {
        items.push(InputItem::Message {
            role: message.role.as_ref().to_owned(),
            content: convert_content(client, message, vision_base64).await?,
        });
    }

    items.extend(tool_calls.iter().map(|call| InputItem::FunctionCall {
        call_id: call.id.clone(),
        name: call.function.name.clone(),
        arguments: call.function.arguments.clone(),
    }));

    Ok(items)
}

async fn convert_content(client: &Client, message: &Message, vision_base64: bool) -> Result<InputContent, RuntimeError> {
    let text_part = |text: String| {
        if message.role == Role::Assistant {
            InputPart::OutputText { text }
        } else {
            InputPart::InputText { text }
        }
    };

    match &message.content {
        Content::Text(text) if message.role == Role::Assistant => {
            Ok(InputContent::Parts(vec![text_part(text.clone())]))
        }
        Content::Text(text) => Ok(InputContent::Text(text.clone())),
        Content::Parts(parts) => {
            let parts = try_join_all(parts.iter().map(|part| async {
                match part {
                    ContentPart::Text { text } => Ok(text_part(text.clone())),
                    ContentPart::ImageUrl { image_url } => {
                        let image_url = if vision_base64 {
                            inline_image_url(client, &image_url.url).await?
                        } else {
                            image_url.url.clone()
                        };
                        Ok::<_, RuntimeError>(InputPart::InputImage { image_url })
                    }
                }
            }))
            .await?;

            Ok(InputContent::Parts(parts))
        }
    }
}
