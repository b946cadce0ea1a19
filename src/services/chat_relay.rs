//! Chat Relay
//!
//! Runs one chat turn: stores the user message, streams the model's answer
//! to the caller fragment by fragment and commits the full answer once the
//! stream completes.
//!
//! ```text
//! Pending -> Streaming -> Committed
//!    |           |
//!    +-----------+------> Failed
//! ```

use crate::configuration::ModelSettings;
use crate::connectors::{ChunkStream, ModelConnector, PromptMessage, StreamChunk};
use crate::errors::AppError;
use crate::models::{Message, NewMessage, Role, TokenUsage};
use crate::services::preset_registry::PresetRegistry;
use crate::store::RecordStore;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Capacity of the event channel used by non-streaming callers.
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Pending,
    Streaming,
    Committed,
    Failed,
}

/// Progress reported to the caller while the turn runs
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// The user message was stored
    UserMessage(Message),
    Fragment(String),
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: Uuid,
    pub text: String,
    /// Switches the conversation to this preset before the turn
    pub preset_id: Option<Uuid>,
}

impl TurnRequest {
    pub fn new(conversation_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            conversation_id,
            text: text.into(),
            preset_id: None,
        }
    }

    pub fn with_preset(mut self, preset_id: Option<Uuid>) -> Self {
        self.preset_id = preset_id;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    pub state: TurnState,
    pub user_message: Option<Message>,
    pub assistant_message: Option<Message>,
    pub error: Option<AppError>,
}

impl TurnOutcome {
    fn new(turn_id: Uuid) -> Self {
        Self {
            turn_id,
            state: TurnState::Pending,
            user_message: None,
            assistant_message: None,
            error: None,
        }
    }

    fn fail(mut self, err: AppError) -> Self {
        tracing::warn!(turn_id = %self.turn_id, from = ?self.state, "Turn failed: {}", err);
        self.state = TurnState::Failed;
        self.error = Some(err);
        self
    }

    /// The committed assistant message, or the error that failed the turn.
    pub fn into_result(self) -> Result<Message, AppError> {
        match (self.assistant_message, self.error) {
            (Some(message), None) => Ok(message),
            (_, Some(err)) => Err(err),
            (None, None) => Err(AppError::Upstream("turn did not complete".to_string())),
        }
    }
}

#[derive(Clone)]
pub struct ChatRelay {
    store: RecordStore,
    presets: PresetRegistry,
    model: Arc<dyn ModelConnector>,
    idle_timeout: Duration,
    context_messages: Option<usize>,
}

impl ChatRelay {
    pub fn new(
        store: RecordStore,
        presets: PresetRegistry,
        model: Arc<dyn ModelConnector>,
        settings: &ModelSettings,
    ) -> Self {
        Self {
            store,
            presets,
            model,
            idle_timeout: settings.idle_timeout(),
            context_messages: settings.context_messages,
        }
    }

    pub fn model(&self) -> &Arc<dyn ModelConnector> {
        &self.model
    }

    /// Runs a turn to completion. Fragments are sent to `events` in the order
    /// the model produced them. Cancelling `cancel`, or dropping the receiving
    /// side of `events`, stops the turn and drops the upstream stream.
    #[tracing::instrument(
        name = "Chat turn",
        skip(self, request, events, cancel),
        fields(conversation_id = %request.conversation_id, turn_id = tracing::field::Empty)
    )]
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        events: mpsc::Sender<TurnEvent>,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        let turn_id = Uuid::new_v4();
        tracing::Span::current().record("turn_id", tracing::field::display(turn_id));
        let mut outcome = TurnOutcome::new(turn_id);

        if request.text.trim().is_empty() {
            return outcome.fail(AppError::Validation("message must not be empty".to_string()));
        }

        // Pending
        let (history, parameters) = match self.prepare(&request).await {
            Ok(prepared) => prepared,
            Err(err) => return outcome.fail(err),
        };
        let user_message = match self
            .store
            .append_message(request.conversation_id, NewMessage::user(request.text.as_str()))
            .await
        {
            Ok(message) => message,
            Err(err) => return outcome.fail(err),
        };
        outcome.user_message = Some(user_message.clone());
        if !forward(&events, &cancel, TurnEvent::UserMessage(user_message.clone())).await {
            return outcome.fail(caller_gone(&cancel));
        }

        let mut prompt = history;
        prompt.push(PromptMessage::new(Role::User, user_message.content));

        // Streaming
        outcome.state = TurnState::Streaming;
        let stream = tokio::select! {
            _ = cancel.cancelled() => return outcome.fail(caller_gone(&cancel)),
            started = tokio::time::timeout(self.idle_timeout, self.model.stream_chat(prompt, parameters)) => {
                match started {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(err)) => return outcome.fail(err.into()),
                    Err(_) => return outcome.fail(self.idle_error()),
                }
            }
        };

        let (text, usage) = match self.drain(stream, &events, &cancel).await {
            Ok(answer) => answer,
            Err(err) => return outcome.fail(err),
        };
        if text.is_empty() {
            return outcome.fail(AppError::Upstream("model returned an empty answer".to_string()));
        }

        // Committed
        let answer = NewMessage::assistant(text)
            .with_usage(usage)
            .with_model(self.model.current_model().await);
        match self.store.append_message(request.conversation_id, answer).await {
            Ok(message) => {
                tracing::info!(message_id = %message.id, "Turn committed");
                outcome.assistant_message = Some(message);
                outcome.state = TurnState::Committed;
                outcome
            }
            Err(err) => outcome.fail(err),
        }
    }

    /// Runs a turn without streaming and returns both stored messages.
    pub async fn complete(&self, request: TurnRequest) -> Result<(Message, Message), AppError> {
        let (sender, mut receiver) = mpsc::channel(EVENT_BUFFER);
        let drain = async move { while receiver.recv().await.is_some() {} };
        let (outcome, _) = tokio::join!(
            self.run_turn(request, sender, CancellationToken::new()),
            drain
        );

        let user_message = outcome.user_message.clone();
        let assistant_message = outcome.into_result()?;
        let user_message = user_message
            .ok_or_else(|| AppError::Upstream("turn did not store the user message".to_string()))?;
        Ok((user_message, assistant_message))
    }

    /// Loads everything the turn needs before the user message is stored:
    /// the system prompt, prior messages and sampling parameters.
    async fn prepare(
        &self,
        request: &TurnRequest,
    ) -> Result<(Vec<PromptMessage>, crate::models::SamplingParams), AppError> {
        let mut conversation = self.store.get_conversation(request.conversation_id).await?;
        if request.preset_id.is_some() && request.preset_id != conversation.preset_id {
            conversation = self
                .store
                .update_conversation(conversation.id, None, request.preset_id)
                .await?;
        }

        let persona = self.presets.persona(conversation.preset_id).await;
        let prior = self
            .store
            .list_messages(conversation.id, self.context_messages)
            .await?;

        let mut history = Vec::with_capacity(prior.len() + 2);
        history.push(PromptMessage::new(Role::System, persona.system_prompt));
        history.extend(
            prior
                .into_iter()
                .map(|message| PromptMessage::new(message.role, message.content)),
        );

        Ok((history, persona.parameters))
    }

    async fn drain(
        &self,
        mut stream: ChunkStream,
        events: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<(String, Option<TokenUsage>), AppError> {
        let mut text = String::new();
        let mut usage = None;
        let mut fragments = 0usize;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(caller_gone(cancel)),
                next = tokio::time::timeout(self.idle_timeout, stream.next()) => next,
            };

            match next {
                Err(_) => return Err(self.idle_error()),
                Ok(None) => break,
                Ok(Some(Err(err))) => return Err(err.into()),
                Ok(Some(Ok(StreamChunk::Usage(reported)))) => usage = Some(reported),
                Ok(Some(Ok(StreamChunk::Fragment(fragment)))) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    text.push_str(&fragment);
                    fragments += 1;
                    if !forward(events, cancel, TurnEvent::Fragment(fragment)).await {
                        return Err(caller_gone(cancel));
                    }
                }
            }
        }

        tracing::debug!(fragments, chars = text.len(), "Model stream finished");
        Ok((text, usage))
    }

    fn idle_error(&self) -> AppError {
        AppError::Upstream(format!(
            "model server sent nothing for {}s",
            self.idle_timeout.as_secs_f32()
        ))
    }
}

/// Sends an event unless the turn is cancelled first. `false` means the
/// caller is gone.
async fn forward(
    events: &mpsc::Sender<TurnEvent>,
    cancel: &CancellationToken,
    event: TurnEvent,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = events.send(event) => sent.is_ok(),
    }
}

fn caller_gone(cancel: &CancellationToken) -> AppError {
    if cancel.is_cancelled() {
        AppError::Upstream("turn cancelled".to_string())
    } else {
        AppError::Upstream("caller disconnected".to_string())
    }
}
