use futures::future::try_join_all;
use http::HeaderMap;
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value, json};

use super::OpenAiCompatibleRuntime;
use crate::context::{ImageFile, ImageSource, convert_image_url_to_file, image_url_to_base64, parse_data_uri};
use crate::error::RuntimeError;
use crate::protocol::images::ImagesResponse;
use crate::protocol::openai::ChatCompletion;
use crate::types::{CreateImagePayload, CreateImageResponse, ImageParams, ImageUsage};

/// Suffix selecting image generation through a chat model
const CHAT_IMAGE_SUFFIX: &str = ":image";

/// Models that reject `response_format`
const NO_RESPONSE_FORMAT_MODELS: &[&str] = &["gpt-image-1", "gpt-image-1-mini"];

impl OpenAiCompatibleRuntime {
    pub(super) async fn create_image_impl(&self, payload: CreateImagePayload) -> Result<CreateImageResponse, RuntimeError> {
        if let Some(hook) = &self.config.create_image {
            return hook(payload, self.transport.clone()).await;
        }

        let result = match payload.model.strip_suffix(CHAT_IMAGE_SUFFIX) {
            Some(model) => self.image_via_chat(model, &payload.params).await,
            None => self.image_via_images_api(&payload.model, &payload.params).await,
        };

        // Pipeline errors keep their message; only upstream failures are classified
        result.map_err(|e| {
            tracing::error!(provider = %self.config.provider, model = %payload.model, error = %e, "image request failed");
            match e {
                RuntimeError::Upstream(transport) => self.classifier.classify(&transport).into(),
                other => other,
            }
        })
    }

    async fn image_via_images_api(&self, model: &str, params: &ImageParams) -> Result<CreateImageResponse, RuntimeError> {
        let inputs = params.input_images();
        let mut options = vendor_params(params);
        if !NO_RESPONSE_FORMAT_MODELS.contains(&model) {
            options.insert("response_format".to_owned(), json!("b64_json"));
        }

        let response: ImagesResponse = if inputs.is_empty() {
            let mut body = Map::new();
            body.insert("model".to_owned(), json!(model));
            body.insert("n".to_owned(), json!(1));
            body.insert("prompt".to_owned(), json!(params.prompt));
            body.extend(options);

            tracing::debug!(provider = %self.config.provider, model = %model, "generating image");
            self.transport
                .post_json("images/generations", &body, &HeaderMap::new(), None)
                .await?
        } else {
            let files = try_join_all(
                inputs
                    .iter()
                    .map(|url| convert_image_url_to_file(self.transport.client(), url)),
            )
            .await
            .map_err(|e| {
                RuntimeError::Image(format!(
                    "Failed to convert image URLs to File objects [{}]: {e}",
                    inputs.join(", ")
                ))
            })?;

            tracing::debug!(provider = %self.config.provider, model = %model, images = files.len(), "editing image");
            let form = edit_form(model, &params.prompt, options, files)?;
            self.transport.post_multipart("images/edits", form, None).await?
        };

        parse_images_response(response)
    }

    async fn image_via_chat(&self, model: &str, params: &ImageParams) -> Result<CreateImageResponse, RuntimeError> {
        let mut content = vec![json!({"type": "text", "text": params.prompt})];

        if let Some(url) = params.input_images().first() {
            let url = self
                .chat_image_url(url)
                .await
                .map_err(|e| RuntimeError::Image(format!("Failed to process image URL: {e}")))?;
            content.push(json!({"type": "image_url", "image_url": {"url": url}}));
        }

        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": content}],
            "stream": false,
        });

        tracing::debug!(provider = %self.config.provider, model = %model, "generating image with chat model");
        let completion: ChatCompletion = self
            .transport
            .post_json("chat/completions", &body, &HeaderMap::new(), None)
            .await?;

        let Some(choice) = completion.choices.first() else {
            return Err(RuntimeError::Image("No message in chat completion response".to_owned()));
        };

        let image_url = choice
            .message
            .images
            .as_deref()
            .and_then(<[_]>::first)
            .map(|image| image.image_url.url.clone())
            .ok_or_else(|| RuntimeError::Image("No image generated in chat completion response".to_owned()))?;

        Ok(CreateImageResponse {
            image_url,
            model_usage: None,
        })
    }

    /// Input image for a chat-model request, always as a `data:` URI
    async fn chat_image_url(&self, url: &str) -> Result<String, RuntimeError> {
        match parse_data_uri(url) {
            ImageSource::Base64 { .. } => Ok(url.to_owned()),
            ImageSource::Url => {
                let (data, mime_type) = image_url_to_base64(self.transport.client(), url).await?;
                Ok(format!("data:{mime_type};base64,{data}"))
            }
            ImageSource::Unsupported => Err(RuntimeError::Image(format!(
                "Currently we don't support image url: {url}"
            ))),
        }
    }
}

/// Parameters forwarded to the images API, minus the ones handled explicitly
fn vendor_params(params: &ImageParams) -> Map<String, Value> {
    let mut options = params.extra.clone();
    if let Some(size) = params.size.as_deref().filter(|size| *size != "auto") {
        options.insert("size".to_owned(), json!(size));
    }
    options
}

fn edit_form(
    model: &str,
    prompt: &str,
    options: Map<String, Value>,
    files: Vec<ImageFile>,
) -> Result<Form, RuntimeError> {
    let mut form = Form::new()
        .text("model", model.to_owned())
        .text("prompt", prompt.to_owned())
        .text("input_fidelity", "high");

    for (key, value) in options {
        let value = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        form = form.text(key, value);
    }

    let field = if files.len() == 1 { "image" } else { "image[]" };
    for file in files {
        let part = Part::bytes(file.bytes)
            .file_name(file.name)
            .mime_str(&file.mime_type)
            .map_err(|e| RuntimeError::Image(format!("Invalid image content type {}: {e}", file.mime_type)))?;
        form = form.part(field, part);
    }

    Ok(form)
}

fn parse_images_response(response: ImagesResponse) -> Result<CreateImageResponse, RuntimeError> {
    let data = response
        .data
        .filter(|data| !data.is_empty())
        .ok_or_else(|| RuntimeError::Image("Invalid image response: missing or empty data array".to_owned()))?;

    let Some(Some(first)) = data.into_iter().next() else {
        return Err(RuntimeError::Image(
            "Invalid image response: first data item is null or undefined".to_owned(),
        ));
    };

    let image_url = match (first.b64_json, first.url) {
        (Some(b64), _) => format!("data:image/png;base64,{b64}"),
        (None, Some(url)) => url,
        (None, None) => {
            return Err(RuntimeError::Image(
                "Invalid image response: missing both b64_json and url fields".to_owned(),
            ));
        }
    };

    let model_usage = response.usage.map(|usage| {
        let details = usage.input_tokens_details.unwrap_or_default();
        ImageUsage {
            input_text_tokens: details.text_tokens,
            input_image_tokens: details.image_tokens,
            output_image_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
        }
    });

    Ok(CreateImageResponse { image_url, model_usage })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(value: Value) -> ImagesResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn auto_size_is_dropped() {
        let params = ImageParams {
            prompt: "a cat".to_owned(),
            size: Some("auto".to_owned()),
            ..ImageParams::default()
        };
        assert!(!vendor_params(&params).contains_key("size"));

        let params = ImageParams {
            size: Some("1024x1024".to_owned()),
            ..params
        };
        assert_eq!(vendor_params(&params)["size"], "1024x1024");
    }

    #[test]
    fn base64_data_becomes_data_url() {
        let response = parse_images_response(images(json!({"data": [{"b64_json": "AAAA"}]}))).unwrap();
        assert_eq!(response.image_url, "data:image/png;base64,AAAA");
        assert_eq!(response.model_usage, None);
    }

    #[test]
    fn hosted_url_is_passed_through() {
        let response = parse_images_response(images(json!({"data": [{"url": "https://cdn.example.com/a.png"}]}))).unwrap();
        assert_eq!(response.image_url, "https://cdn.example.com/a.png");
    }

    #[test]
    fn usage_is_mapped() {
        let response = parse_images_response(images(json!({
            "data": [{"b64_json": "AAAA"}],
            "usage": {
                "input_tokens": 50,
                "output_tokens": 4160,
                "total_tokens": 4210,
                "input_tokens_details": {"text_tokens": 40, "image_tokens": 10}
            }
        })))
        .unwrap();

        assert_eq!(
            response.model_usage,
            Some(ImageUsage {
                input_text_tokens: 40,
                input_image_tokens: 10,
                output_image_tokens: 4160,
                total_tokens: 4210,
            })
        );
    }

    #[test]
    fn malformed_responses_are_descriptive() {
        let cases = [
            (json!({}), "missing or empty data array"),
            (json!({"data": []}), "missing or empty data array"),
            (json!({"data": "nope"}), "missing or empty data array"),
            (json!({"data": [null]}), "first data item is null or undefined"),
            (json!({"data": [{}]}), "missing both b64_json and url fields"),
        ];

        for (body, expected) in cases {
            let error = parse_images_response(images(body)).unwrap_err();
            assert!(error.to_string().contains(expected), "{error}");
        }
    }
}
