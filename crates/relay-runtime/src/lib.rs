//! OpenAI-compatible provider runtimes for Relay
//!
//! One generic runtime serves every vendor that speaks the chat completions
//! protocol. A declarative [`ProviderConfig`] captures each vendor's quirks;
//! [`RuntimeFactory`] turns it into runtimes exposing `chat`, `models`,
//! `generate_object` and `create_image`, with streamed output normalized into
//! canonical [`StreamChunk`]s and failures classified into
//! [`AgentRuntimeErrorType`]s.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod context;
pub mod error;
pub mod factory;
pub mod protocol;
pub mod providers;
pub mod stream;
pub mod transport;
pub mod types;

pub use error::{AgentRuntimeErrorType, ChatCompletionError, RuntimeError, TransportError};
pub use factory::{
    ChatResponse, ModelRuntime, OpenAiCompatibleRuntime, ProviderConfig, RuntimeFactory, RuntimeOptions,
};
pub use stream::StreamCallbacks;
pub use types::{ChatOptions, ChatPayload, Message, StreamChunk, StreamEvent};
