use super::{ChunkStream, ModelConnector, PromptMessage, StreamChunk};
use crate::connectors::ConnectorError;
use crate::models::{SamplingParams, TokenUsage};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum ScriptStep {
    Fragment(String),
    Usage(TokenUsage),
    Fail(String),
    /// Never yields; the stream hangs until dropped
    Stall,
}

/// Replays a fixed script instead of calling a model server.
#[derive(Default)]
pub struct ScriptedModel {
    steps: Vec<ScriptStep>,
    refuse: Option<String>,
    /// Number of steps the consumer pulled
    pub consumed: Arc<AtomicUsize>,
    /// Set once the consumer dropped the stream
    pub dropped: Arc<AtomicBool>,
    pub requests: Mutex<Vec<(Vec<PromptMessage>, SamplingParams)>>,
}

impl ScriptedModel {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self::steps(
            fragments
                .iter()
                .map(|f| ScriptStep::Fragment(f.to_string()))
                .collect(),
        )
    }

    pub fn steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    /// `stream_chat` itself fails, as when the server is down.
    pub fn unreachable(message: &str) -> Self {
        Self {
            refuse: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn last_request(&self) -> Option<(Vec<PromptMessage>, SamplingParams)> {
        self.requests.lock().unwrap().last().cloned()
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelConnector for ScriptedModel {
    async fn stream_chat(
        &self,
        history: Vec<PromptMessage>,
        params: SamplingParams,
    ) -> Result<ChunkStream, ConnectorError> {
        self.requests.lock().unwrap().push((history, params));
        if let Some(message) = &self.refuse {
            return Err(ConnectorError::ServiceUnavailable(message.clone()));
        }

        let consumed = self.consumed.clone();
        let flag = DropFlag(self.dropped.clone());

        let stream = futures::stream::iter(self.steps.clone()).then(move |step| {
            let consumed = consumed.clone();
            let _alive = &flag;
            async move {
                match step {
                    ScriptStep::Stall => futures::future::pending().await,
                    ScriptStep::Fragment(text) => {
                        consumed.fetch_add(1, Ordering::SeqCst);
                        Ok(StreamChunk::Fragment(text))
                    }
                    ScriptStep::Usage(usage) => {
                        consumed.fetch_add(1, Ordering::SeqCst);
                        Ok(StreamChunk::Usage(usage))
                    }
                    ScriptStep::Fail(message) => {
                        consumed.fetch_add(1, Ordering::SeqCst);
                        Err(ConnectorError::HttpError(message))
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn list_models(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(vec!["scripted".to_string()])
    }

    async fn current_model(&self) -> Option<String> {
        Some("scripted".to_string())
    }
}
