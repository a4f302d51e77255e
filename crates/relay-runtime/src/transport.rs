//! Authenticated HTTP transport to an OpenAI-compatible API

use std::future::Future;

use futures_util::StreamExt;
use http::{HeaderMap, HeaderValue, Method, header};
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::stream::ByteStream;

/// Stateless client bound to one base URL and credential
///
/// Cloning is cheap and calls on clones are independent.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
    api_key: SecretString,
    default_headers: HeaderMap,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}

impl Transport {
    pub fn new(base_url: &str, api_key: SecretString, default_headers: HeaderMap) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            default_headers,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Underlying HTTP client, shared for unauthenticated fetches such as image downloads
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Absolute URL for an API path such as `chat/completions`
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str, headers: &HeaderMap) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .headers(self.default_headers.clone())
            .headers(headers.clone())
    }

    /// `POST` a JSON body, returning the raw successful response
    pub async fn post(
        &self,
        path: &str,
        body: &impl Serialize,
        headers: &HeaderMap,
        signal: Option<&CancellationToken>,
    ) -> Result<Response, TransportError> {
        let mut headers = headers.clone();
        headers
            .entry(header::ACCEPT)
            .or_insert(HeaderValue::from_static("*/*"));

        self.send(self.request(Method::POST, path, &headers).json(body), signal)
            .await
    }

    /// `POST` a JSON body and decode the JSON response
    pub async fn post_json<R: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
        headers: &HeaderMap,
        signal: Option<&CancellationToken>,
    ) -> Result<R, TransportError> {
        let response = self.post(path, body, headers, signal).await?;
        read_json(response, signal).await
    }

    /// `POST` a multipart form and decode the JSON response
    pub async fn post_multipart<R: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
        signal: Option<&CancellationToken>,
    ) -> Result<R, TransportError> {
        let builder = self
            .request(Method::POST, path, &HeaderMap::new())
            .multipart(form);
        let response = self.send(builder, signal).await?;
        read_json(response, signal).await
    }

    /// `GET` and decode the JSON response
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, TransportError> {
        let response = self
            .send(self.request(Method::GET, path, &HeaderMap::new()), None)
            .await?;
        read_json(response, None).await
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        signal: Option<&CancellationToken>,
    ) -> Result<Response, TransportError> {
        let response = cancellable(signal, builder.send()).await?.map_err(|e| {
            tracing::error!(base_url = %self.base_url, error = %e, "upstream request failed");
            TransportError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = cancellable(signal, response.text()).await?.unwrap_or_default();
        tracing::warn!(base_url = %self.base_url, status = %status, "upstream returned error");

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Err(TransportError::Status { status, body })
    }
}

/// Race a future against the caller's cancellation signal
async fn cancellable<F: Future>(signal: Option<&CancellationToken>, future: F) -> Result<F::Output, TransportError> {
    match signal {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(TransportError::Aborted),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}

/// Read a whole successful response body as JSON
pub async fn read_json<R: DeserializeOwned>(
    response: Response,
    signal: Option<&CancellationToken>,
) -> Result<R, TransportError> {
    let bytes = cancellable(signal, response.bytes()).await??;
    serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Response body as a byte stream that ends with [`TransportError::Aborted`] on cancellation
pub fn body_stream(response: Response, signal: Option<CancellationToken>) -> ByteStream {
    let body = response.bytes_stream().map(|item| item.map_err(TransportError::from));

    let Some(token) = signal else {
        return Box::pin(body);
    };

    let state = (Box::pin(body), token, false);
    Box::pin(futures_util::stream::unfold(state, |(mut body, token, done)| async move {
        if done {
            return None;
        }

        tokio::select! {
            biased;
            () = token.cancelled() => Some((Err(TransportError::Aborted), (body, token, true))),
            item = body.next() => item.map(|item| (item, (body, token, false))),
        }
    }))
}
