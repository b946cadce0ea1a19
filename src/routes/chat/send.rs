use crate::forms::ChatForm;
use crate::helpers::JsonResponse;
use crate::models::Message;
use crate::services::{ChatRelay, SessionMultiplexer, TurnRequest};
use crate::store::RecordStore;
use actix_web::{post, web, Responder, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_valid::Validate;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub conversation_id: Uuid,
    pub message: Message,
    pub timestamp: DateTime<Utc>,
}

/// POST /api/chat
/// Non-streaming chat; starts a new conversation when `conversation_id` is
/// omitted.
#[tracing::instrument(name = "Chat.", skip(form, store, relay, multiplexer))]
#[post("/chat")]
pub async fn item(
    form: web::Json<ChatForm>,
    store: web::Data<RecordStore>,
    relay: web::Data<ChatRelay>,
    multiplexer: web::Data<Arc<SessionMultiplexer>>,
) -> Result<impl Responder> {
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<ChatReply>::build().form_error(errors.to_string()));
    }

    let form = form.into_inner();
    let conversation = match form.conversation_id {
        Some(id) => store.get_conversation(id).await?,
        None => store.create_conversation("", form.preset_id).await?,
    };

    let request = TurnRequest::new(conversation.id, form.message).with_preset(form.preset_id);
    let (_, assistant_message) =
        super::relay_turn(relay.get_ref(), multiplexer.get_ref(), request).await?;

    let reply = ChatReply {
        response: assistant_message.content.clone(),
        conversation_id: conversation.id,
        timestamp: assistant_message.created_at,
        message: assistant_message,
    };
    Ok(JsonResponse::build().set_item(reply).ok("OK"))
}
