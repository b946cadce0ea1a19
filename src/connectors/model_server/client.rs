use super::sse::{parse_chunk, SseDecoder, SseEvent};
use super::{ChunkStream, ModelConnector, PromptMessage, StreamChunk};
use crate::configuration::ModelSettings;
use crate::connectors::ConnectorError;
use crate::models::SamplingParams;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Client for an OpenAI-compatible chat server (LM Studio, llama.cpp server,
/// vLLM ...).
pub struct LmStudioClient {
    http_client: reqwest::Client,
    settings: ModelSettings,
    /// Configured model, or the first one the server reported
    model: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl LmStudioClient {
    pub fn new(settings: ModelSettings) -> Result<Self, ConnectorError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|err| ConnectorError::ServiceUnavailable(err.to_string()))?;

        Ok(Self {
            http_client,
            model: RwLock::new(settings.model.clone()),
            settings,
        })
    }

    async fn resolve_model(&self) -> Result<String, ConnectorError> {
        if let Some(model) = self.model.read().await.clone() {
            return Ok(model);
        }

        let model = self
            .list_models()
            .await?
            .into_iter()
            .next()
            .ok_or(ConnectorError::NoModelAvailable)?;
        tracing::info!("Using model {} reported by the server", model);
        *self.model.write().await = Some(model.clone());

        Ok(model)
    }
}

#[async_trait]
impl ModelConnector for LmStudioClient {
    #[tracing::instrument(name = "Model stream_chat", skip(self, history, params), fields(messages = history.len()))]
    async fn stream_chat(
        &self,
        history: Vec<PromptMessage>,
        params: SamplingParams,
    ) -> Result<ChunkStream, ConnectorError> {
        let model = self.resolve_model().await?;
        let payload = serde_json::json!({
            "model": model,
            "messages": history,
            "stream": true,
            "stream_options": { "include_usage": true },
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "top_p": params.top_p,
            "presence_penalty": params.presence_penalty,
            "frequency_penalty": params.frequency_penalty,
        });

        let response = self
            .http_client
            .post(self.settings.endpoint("/v1/chat/completions"))
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                tracing::error!("Model server request failed: {:?}", err);
                ConnectorError::from(err)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Model server returned {}: {}", status, body);
            return Err(ConnectorError::HttpError(format!("{} - {}", status, body)));
        }

        Ok(sse_chunks(Box::pin(response.bytes_stream())).boxed())
    }

    async fn list_models(&self) -> Result<Vec<String>, ConnectorError> {
        let response = self
            .http_client
            .get(self.settings.endpoint("/v1/models"))
            .timeout(Duration::from_secs(self.settings.request_timeout_secs))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::HttpError(format!(
                "listing models failed with {}",
                status
            )));
        }

        let models = response
            .json::<ModelList>()
            .await
            .map_err(|err| ConnectorError::InvalidResponse(err.to_string()))?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    async fn current_model(&self) -> Option<String> {
        self.model.read().await.clone()
    }
}

struct SseState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamChunk, ConnectorError>>,
    finished: bool,
}

/// Adapts a raw SSE body into completion chunks. The stream ends at
/// `[DONE]`, at the end of the body, or right after the first error.
fn sse_chunks<S, B>(body: S) -> impl Stream<Item = Result<StreamChunk, ConnectorError>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            let events = match state.body.next().await {
                Some(Ok(bytes)) => state.decoder.push(bytes.as_ref()),
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(ConnectorError::from(err)), state));
                }
                None => {
                    state.finished = true;
                    state.decoder.finish().into_iter().collect()
                }
            };

            for event in events {
                match event {
                    SseEvent::Data(data) => state.pending.extend(parse_chunk(&data)),
                    SseEvent::Done => {
                        state.finished = true;
                        break;
                    }
                }
            }
        }
    })
}
