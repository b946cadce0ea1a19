use crate::forms::ConversationForm;
use crate::helpers::JsonResponse;
use crate::models::Conversation;
use crate::store::RecordStore;
use actix_web::{post, web, Responder, Result};
use serde_valid::Validate;

#[tracing::instrument(name = "Add conversation.", skip(store))]
#[post("")]
pub async fn item(
    form: web::Json<ConversationForm>,
    store: web::Data<RecordStore>,
) -> Result<impl Responder> {
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<Conversation>::build().form_error(errors.to_string()));
    }

    let title = form.title.as_deref().unwrap_or_default();
    let conversation = store.create_conversation(title, form.preset_id).await?;
    Ok(JsonResponse::build().set_item(conversation).created("Created"))
}
