//! Stream event normalizer
//!
//! Every upstream shape (chat completions SSE, responses API SSE, or a single
//! complete response object) is decoded into [`StreamChunk`]s and then passed
//! through one post-processing stage that owns the ordering guarantees:
//! usage is followed by a speed chunk, and the stop chunk is always last.

mod callbacks;
mod non_stream;
mod openai;
pub(crate) mod protocol;
mod responses;
mod tee;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use serde_json::Value;

pub use callbacks::StreamCallbacks;
pub use non_stream::{completion_to_frames, response_to_chunks};
pub use openai::ChatChunkTransformer;
pub use protocol::{
    SPEED_CHUNK_ID, SpeedMode, TokenSpeedCalculator, convert_responses_usage, convert_usage,
    generate_tool_call_id, parse_sse_data,
};
pub use responses::ResponsesEventTransformer;
pub use tee::fan_out;

use crate::error::{ErrorClassifier, RuntimeError, TransportError};
use crate::types::{StreamChunk, StreamEvent};
use callbacks::CallbackState;

/// Raw upstream body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Canonical event stream handed to callers
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, RuntimeError>> + Send>>;

/// SSE-encoded canonical stream
pub type SseStream = Pin<Box<dyn Stream<Item = Result<Bytes, RuntimeError>> + Send>>;

type FrameStream = Pin<Box<dyn Stream<Item = Result<Vec<StreamChunk>, RuntimeError>> + Send>>;

/// Error object delivered inside an otherwise healthy upstream stream
#[derive(Debug, Clone, PartialEq)]
pub struct VendorError(pub Value);

/// Turns one decoded upstream frame into canonical chunks
///
/// Decoders are stateful: tool call ids, `<think>` state and responses API
/// item indices carry across frames of a single response.
pub trait ChunkDecoder: Send {
    fn decode(&mut self, raw: Value) -> Result<Vec<StreamChunk>, VendorError>;
}

/// Per-call context for the normalizer
#[derive(Clone)]
pub struct StreamSettings {
    pub classifier: ErrorClassifier,
    /// When the upstream call was issued
    pub input_start_at: Instant,
    pub callbacks: Option<Arc<dyn StreamCallbacks>>,
}

impl std::fmt::Debug for StreamSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSettings")
            .field("endpoint", &self.classifier.endpoint())
            .field("input_start_at", &self.input_start_at)
            .field("callbacks", &self.callbacks.is_some())
            .finish()
    }
}

/// Normalize an SSE upstream body
pub fn normalize_sse<D>(body: ByteStream, mut decoder: D, settings: StreamSettings) -> EventStream
where
    D: ChunkDecoder + 'static,
{
    let classifier = settings.classifier.clone();

    let frames = body.eventsource().filter_map(move |event| {
        let frame = match event {
            Ok(event) => parse_sse_data(&event.data).map(|raw| {
                decoder
                    .decode(raw)
                    .map_err(|VendorError(body)| RuntimeError::from(classifier.classify_stream_error(&body)))
            }),
            Err(EventStreamError::Transport(e)) => {
                tracing::error!(error = %e, "upstream stream failed");
                Some(Err(classifier.classify(&e).into()))
            }
            Err(e) => Some(Err(classifier
                .classify(&TransportError::Decode(e.to_string()))
                .into())),
        };
        std::future::ready(frame)
    });

    post_process(Box::pin(frames), settings, SpeedMode::Incremental)
}

/// Normalize frames synthesized from a complete (non-streaming) response
pub fn normalize_frames<D>(frames: Vec<Value>, mut decoder: D, settings: StreamSettings) -> EventStream
where
    D: ChunkDecoder + 'static,
{
    let classifier = settings.classifier.clone();
    let decoded: Vec<_> = frames
        .into_iter()
        .map(|raw| {
            decoder
                .decode(raw)
                .map_err(|VendorError(body)| RuntimeError::from(classifier.classify_stream_error(&body)))
        })
        .collect();

    post_process(Box::pin(futures_util::stream::iter(decoded)), settings, SpeedMode::Total)
}

/// Normalize chunks that are already canonical
pub fn normalize_chunks(chunks: Vec<StreamChunk>, settings: StreamSettings) -> EventStream {
    let frames = futures_util::stream::iter(chunks.into_iter().map(|chunk| Ok(vec![chunk])));
    post_process(Box::pin(frames), settings, SpeedMode::Total)
}

/// Encode a canonical stream as SSE frames
pub fn into_sse(events: EventStream) -> SseStream {
    Box::pin(events.map(|event| event.map(|chunk| Bytes::from(chunk.to_sse()))))
}

struct PostProcessor {
    frames: FrameStream,
    queue: VecDeque<StreamChunk>,
    pending_stop: Option<StreamChunk>,
    speed: TokenSpeedCalculator,
    callbacks: Option<Arc<dyn StreamCallbacks>>,
    callback_state: CallbackState,
    exhausted: bool,
    failed: bool,
}

impl PostProcessor {
    fn enqueue(&mut self, chunks: Vec<StreamChunk>) {
        for chunk in chunks {
            if matches!(chunk.event, StreamEvent::Stop(_)) {
                self.pending_stop = Some(chunk);
                continue;
            }

            let speed = self.speed.observe(&chunk);
            self.queue.push_back(chunk);
            self.queue.extend(speed);
        }
    }

    fn emit(&mut self, chunk: &StreamChunk) {
        if let Some(callbacks) = &self.callbacks {
            self.callback_state.observe(callbacks.as_ref(), chunk);
        }
    }

    fn complete(&mut self) {
        if let Some(callbacks) = self.callbacks.take() {
            self.callback_state.finish(callbacks.as_ref());
        }
    }
}

fn post_process(frames: FrameStream, settings: StreamSettings, mode: SpeedMode) -> EventStream {
    let processor = PostProcessor {
        frames,
        queue: VecDeque::new(),
        pending_stop: None,
        speed: TokenSpeedCalculator::new(settings.input_start_at, mode),
        callbacks: settings.callbacks,
        callback_state: CallbackState::default(),
        exhausted: false,
        failed: false,
    };

    Box::pin(futures_util::stream::unfold(processor, |mut p| async move {
        loop {
            if let Some(chunk) = p.queue.pop_front() {
                p.emit(&chunk);
                return Some((Ok(chunk), p));
            }

            if p.exhausted {
                if !p.failed {
                    p.complete();
                }
                return None;
            }

            match p.frames.next().await {
                Some(Ok(chunks)) => p.enqueue(chunks),
                Some(Err(e)) => {
                    // An erroring stream ends without a stop chunk
                    p.exhausted = true;
                    p.failed = true;
                    p.pending_stop = None;
                    return Some((Err(e), p));
                }
                None => {
                    p.exhausted = true;
                    if let Some(stop) = p.pending_stop.take() {
                        p.queue.push_back(stop);
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures_util::TryStreamExt;
    use serde_json::json;

    use super::*;
    use crate::error::AgentRuntimeErrorType;
    use crate::types::ModelUsage;

    const BASE: &str = "https://api.openai.com/v1";

    fn settings() -> StreamSettings {
        StreamSettings {
            classifier: ErrorClassifier::new("openai", BASE, BASE),
            input_start_at: Instant::now(),
            callbacks: None,
        }
    }

    fn body(frames: &[&str]) -> ByteStream {
        let items: Vec<Result<Bytes, TransportError>> =
            frames.iter().map(|f| Ok(Bytes::from(format!("data: {f}\n\n")))).collect();
        Box::pin(futures_util::stream::iter(items))
    }

    fn kinds(chunks: &[StreamChunk]) -> Vec<&'static str> {
        chunks.iter().map(StreamChunk::kind).collect()
    }

    #[tokio::test]
    async fn text_usage_speed_stop_order() {
        let stream = normalize_sse(
            body(&[
                r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"hi"}}]}"#,
                r#"{"id":"c1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#,
                "[DONE]",
            ]),
            ChatChunkTransformer::default(),
            settings(),
        );

        let chunks: Vec<StreamChunk> = stream.try_collect().await.unwrap();
        assert_eq!(kinds(&chunks), ["text", "usage", "speed", "stop"]);
        assert_eq!(chunks[0].event, StreamEvent::Text("hi".to_owned()));
        assert_eq!(chunks[2].id, SPEED_CHUNK_ID);
        assert_eq!(chunks[3].event, StreamEvent::Stop("stop".to_owned()));
    }

    #[tokio::test]
    async fn trailing_usage_chunk_still_precedes_stop() {
        let stream = normalize_sse(
            body(&[
                r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"hi"}}]}"#,
                r#"{"id":"c1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
                r#"{"id":"c1","choices":[],"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#,
                "[DONE]",
            ]),
            ChatChunkTransformer::default(),
            settings(),
        );

        let chunks: Vec<StreamChunk> = stream.try_collect().await.unwrap();
        assert_eq!(kinds(&chunks), ["text", "usage", "speed", "stop"]);
    }

    #[tokio::test]
    async fn garbage_lines_are_skipped() {
        let stream = normalize_sse(
            body(&[
                "{oops",
                r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"ok"},"finish_reason":"stop"}]}"#,
            ]),
            ChatChunkTransformer::default(),
            settings(),
        );

        let chunks: Vec<StreamChunk> = stream.try_collect().await.unwrap();
        assert_eq!(kinds(&chunks), ["text", "stop"]);
    }

    #[tokio::test]
    async fn in_stream_error_ends_without_stop() {
        let stream = normalize_sse(
            body(&[
                r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"partial"}}]}"#,
                r#"{"error":{"message":"overloaded","code":"busy"}}"#,
                r#"{"id":"c1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            ]),
            ChatChunkTransformer::default(),
            settings(),
        );

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        let error = items[1].as_ref().unwrap_err();
        assert_eq!(error.error_type(), Some(AgentRuntimeErrorType::ProviderBizError));
    }

    #[tokio::test]
    async fn transport_abort_surfaces_as_abort() {
        let items: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"a\"}}]}\n\n",
            )),
            Err(TransportError::Aborted),
        ];
        let stream = normalize_sse(
            Box::pin(futures_util::stream::iter(items)),
            ChatChunkTransformer::default(),
            settings(),
        );

        let items: Vec<_> = stream.collect().await;
        assert!(items.last().unwrap().as_ref().unwrap_err().is_abort());
    }

    #[tokio::test]
    async fn frames_split_across_byte_chunks() {
        let items: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"data: {\"id\":\"c1\",\"choices\":[{\"index\":0,")),
            Ok(Bytes::from_static(b"\"delta\":{\"content\":\"joined\"}}]}\n\n")),
        ];
        let stream = normalize_sse(
            Box::pin(futures_util::stream::iter(items)),
            ChatChunkTransformer::default(),
            settings(),
        );

        let chunks: Vec<StreamChunk> = stream.try_collect().await.unwrap();
        assert_eq!(chunks[0].event, StreamEvent::Text("joined".to_owned()));
    }

    #[tokio::test]
    async fn sse_encoding_of_canonical_stream() {
        let chunks = vec![
            StreamChunk::new("r1", StreamEvent::Text("hi".to_owned())),
            StreamChunk::new("r1", StreamEvent::Stop("stop".to_owned())),
        ];
        let bytes: Vec<Bytes> = into_sse(normalize_chunks(chunks, settings()))
            .try_collect()
            .await
            .unwrap();

        let text: String = bytes.iter().map(|b| String::from_utf8_lossy(b).into_owned()).collect();
        assert_eq!(
            text,
            "id: r1\nevent: text\ndata: \"hi\"\n\nid: r1\nevent: stop\ndata: \"stop\"\n\n"
        );
    }

    #[tokio::test]
    async fn callbacks_observe_the_stream() {
        #[derive(Default)]
        struct Collect(Mutex<(String, Option<u64>, bool)>);

        impl StreamCallbacks for Collect {
            fn on_usage(&self, usage: &ModelUsage) {
                self.0.lock().unwrap().1 = Some(usage.total_tokens);
            }

            fn on_completion(&self, text: &str) {
                let mut state = self.0.lock().unwrap();
                state.0 = text.to_owned();
                state.2 = true;
            }
        }

        let collect = Arc::new(Collect::default());
        let mut settings = settings();
        settings.callbacks = Some(collect.clone() as Arc<dyn StreamCallbacks>);

        let stream = normalize_sse(
            body(&[
                r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"he"}}]}"#,
                r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"y"},"finish_reason":"stop"}],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#,
            ]),
            ChatChunkTransformer::default(),
            settings,
        );
        let _: Vec<StreamChunk> = stream.try_collect().await.unwrap();

        let state = collect.0.lock().unwrap();
        assert_eq!(state.0, "hey");
        assert_eq!(state.1, Some(3));
        assert!(state.2);
    }

    #[tokio::test]
    async fn non_stream_frames_use_same_framing() {
        let completion = serde_json::from_value(json!({
            "id": "c9",
            "model": "m",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "answer", "reasoning_content": "think first"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        }))
        .unwrap();

        let stream = normalize_frames(
            completion_to_frames(&completion),
            ChatChunkTransformer::default(),
            settings(),
        );
        let chunks: Vec<StreamChunk> = stream.try_collect().await.unwrap();

        assert_eq!(kinds(&chunks), ["reasoning", "text", "usage", "speed", "stop"]);
        assert!(chunks.iter().all(|c| c.id == "c9" || c.id == SPEED_CHUNK_ID));
    }
}
