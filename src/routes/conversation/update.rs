use crate::forms::ConversationPatch;
use crate::helpers::JsonResponse;
use crate::models::Conversation;
use crate::store::RecordStore;
use actix_web::{put, web, Responder, Result};
use serde_valid::Validate;
use uuid::Uuid;

/// Renames the conversation and/or switches its preset.
#[tracing::instrument(name = "Update conversation.", skip(store))]
#[put("/{id}")]
pub async fn item(
    path: web::Path<(Uuid,)>,
    form: web::Json<ConversationPatch>,
    store: web::Data<RecordStore>,
) -> Result<impl Responder> {
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<Conversation>::build().form_error(errors.to_string()));
    }

    let conversation = store
        .update_conversation(path.0, form.title.as_deref(), form.preset_id)
        .await?;

    Ok(JsonResponse::build().set_item(conversation).ok("Updated"))
}
