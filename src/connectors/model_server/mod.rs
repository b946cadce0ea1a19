//! Model server connector
//!
//! `stream_chat` is the only capability the chat relay needs: an ordered
//! history and sampling parameters in, a lazy finite stream of text
//! fragments out. Dropping the stream releases the upstream request.

use super::ConnectorError;
use crate::models::{Role, SamplingParams, TokenUsage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

pub mod client;
pub(crate) mod sse;
#[cfg(test)]
pub mod mock;

pub use client::LmStudioClient;
#[cfg(test)]
pub use mock::{ScriptStep, ScriptedModel};

/// One entry of the prompt history sent upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Fragment(String),
    /// Token accounting, usually sent once right before the end of stream
    Usage(TokenUsage),
}

pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ConnectorError>>;

#[async_trait]
pub trait ModelConnector: Send + Sync {
    /// Start a streamed completion for `history`.
    async fn stream_chat(
        &self,
        history: Vec<PromptMessage>,
        params: SamplingParams,
    ) -> Result<ChunkStream, ConnectorError>;

    /// Model ids the server can serve.
    async fn list_models(&self) -> Result<Vec<String>, ConnectorError>;

    /// Model used for completions, when already known.
    async fn current_model(&self) -> Option<String> {
        None
    }
}
