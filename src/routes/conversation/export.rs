use crate::helpers::JsonResponse;
use crate::models::{Conversation, Message, Preset};
use crate::store::RecordStore;
use actix_web::{get, web, Responder, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Self-contained snapshot of a conversation
#[derive(Debug, Serialize)]
pub struct ConversationExport {
    pub conversation: Conversation,
    pub preset: Option<Preset>,
    pub messages: Vec<Message>,
    pub exported_at: DateTime<Utc>,
}

#[tracing::instrument(name = "Export conversation.", skip(store))]
#[get("/{id}/export")]
pub async fn item(path: web::Path<(Uuid,)>, store: web::Data<RecordStore>) -> Result<impl Responder> {
    let conversation = store.get_conversation(path.0).await?;
    let messages = store.list_messages(conversation.id, None).await?;
    let preset = match conversation.preset_id {
        Some(preset_id) => store.get_preset(preset_id).await.ok(),
        None => None,
    };

    let export = ConversationExport {
        conversation,
        preset,
        messages,
        exported_at: Utc::now(),
    };
    Ok(JsonResponse::build().set_item(export).ok("OK"))
}
