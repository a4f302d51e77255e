use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header;
use reqwest::Client;

use crate::error::RuntimeError;

const DEFAULT_MIME_TYPE: &str = "image/png";

/// Classification of an image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource<'a> {
    /// `data:<mime>;base64,<data>`
    Base64 { mime_type: Option<&'a str>, data: &'a str },
    /// `http(s)://` URL
    Url,
    /// Anything else (`file://`, plain data URIs without base64...)
    Unsupported,
}

/// Classify an image URL
pub fn parse_data_uri(url: &str) -> ImageSource<'_> {
    if let Some(rest) = url.strip_prefix("data:") {
        let Some((meta, data)) = rest.split_once(',') else {
            return ImageSource::Unsupported;
        };
        let Some(mime_type) = meta.strip_suffix(";base64") else {
            return ImageSource::Unsupported;
        };

        return ImageSource::Base64 {
            mime_type: Some(mime_type).filter(|m| !m.is_empty()),
            data,
        };
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        ImageSource::Url
    } else {
        ImageSource::Unsupported
    }
}

/// Image bytes ready for a multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    fn new(bytes: Vec<u8>, mime_type: &str) -> Self {
        let extension = mime_type
            .split_once('/')
            .map_or("png", |(_, subtype)| subtype.split(';').next().unwrap_or("png"));

        Self {
            name: format!("image.{extension}"),
            mime_type: mime_type.to_owned(),
            bytes,
        }
    }
}

/// Download an image, returning its bytes and content type
async fn fetch_image(client: &Client, url: &str) -> Result<(Vec<u8>, String), RuntimeError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| RuntimeError::Image(format!("Failed to fetch image from {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RuntimeError::Image(format!("Failed to fetch image from {url}: {status}")));
    }

    let mime_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_owned();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| RuntimeError::Image(format!("Failed to fetch image from {url}: {e}")))?;

    Ok((bytes.to_vec(), mime_type))
}

/// Fetch a hosted image and encode it as base64
///
/// Returns `(base64, mime_type)`.
pub async fn image_url_to_base64(client: &Client, url: &str) -> Result<(String, String), RuntimeError> {
    let (bytes, mime_type) = fetch_image(client, url).await?;
    Ok((STANDARD.encode(bytes), mime_type))
}

/// Inline a hosted image as a `data:` URI, leaving other references untouched
pub async fn inline_image_url(client: &Client, url: &str) -> Result<String, RuntimeError> {
    match parse_data_uri(url) {
        ImageSource::Url => {
            let (data, mime_type) = image_url_to_base64(client, url).await?;
            Ok(format!("data:{mime_type};base64,{data}"))
        }
        _ => Ok(url.to_owned()),
    }
}

/// Turn a hosted URL or base64 data URI into an uploadable file
pub async fn convert_image_url_to_file(client: &Client, url: &str) -> Result<ImageFile, RuntimeError> {
    match parse_data_uri(url) {
        ImageSource::Base64 { mime_type, data } => {
            if data.is_empty() {
                return Err(RuntimeError::Image("Invalid data URL: missing base64 data".to_owned()));
            }
            let bytes = STANDARD
                .decode(data)
                .map_err(|e| RuntimeError::Image(format!("Invalid data URL: {e}")))?;
            Ok(ImageFile::new(bytes, mime_type.unwrap_or(DEFAULT_MIME_TYPE)))
        }
        ImageSource::Url => {
            let (bytes, mime_type) = fetch_image(client, url).await?;
            Ok(ImageFile::new(bytes, &mime_type))
        }
        ImageSource::Unsupported => Err(RuntimeError::Image(format!("Currently we don't support image url: {url}"))),
    }
}
