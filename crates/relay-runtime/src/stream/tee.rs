use bytes::Bytes;
use futures::channel::mpsc;
use futures_util::StreamExt;

use super::ByteStream;
use crate::error::TransportError;

/// Split one upstream body into a production branch and a debug-logging branch
///
/// A single task drives the upstream body and forwards every item to both
/// consumers. The debug branch logs raw chunks at `debug` level and never
/// applies backpressure to production. When `debug` is false the body is
/// returned untouched.
pub fn fan_out(body: ByteStream, debug: bool, provider: &str) -> ByteStream {
    if !debug {
        return body;
    }

    let (production_tx, production_rx) = mpsc::unbounded::<Result<Bytes, TransportError>>();
    let (debug_tx, mut debug_rx) = mpsc::unbounded::<Bytes>();

    let provider = provider.to_owned();
    tokio::spawn(async move {
        while let Some(bytes) = debug_rx.next().await {
            tracing::debug!(provider = %provider, chunk = %String::from_utf8_lossy(&bytes), "upstream chunk");
        }
        tracing::debug!(provider = %provider, "upstream stream ended");
    });

    tokio::spawn(async move {
        let mut body = body;
        while let Some(item) = body.next().await {
            if let Ok(bytes) = &item {
                // The debug consumer going away must not affect production
                let _ = debug_tx.unbounded_send(bytes.clone());
            }
            if production_tx.unbounded_send(item).is_err() {
                break;
            }
        }
    });

    Box::pin(production_rx)
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;

    fn body() -> ByteStream {
        let items: Vec<Result<Bytes, TransportError>> =
            vec![Ok(Bytes::from_static(b"data: 1\n\n")), Ok(Bytes::from_static(b"data: 2\n\n"))];
        Box::pin(futures_util::stream::iter(items))
    }

    #[tokio::test]
    async fn production_branch_sees_every_chunk() {
        let chunks: Vec<Bytes> = fan_out(body(), true, "openai").try_collect().await.unwrap();
        assert_eq!(chunks, [Bytes::from_static(b"data: 1\n\n"), Bytes::from_static(b"data: 2\n\n")]);
    }

    #[tokio::test]
    async fn disabled_debug_is_passthrough() {
        let chunks: Vec<Bytes> = fan_out(body(), false, "openai").try_collect().await.unwrap();
        assert_eq!(chunks.len(), 2);
    }
}
