use crate::helpers::JsonResponse;
use crate::models::ConversationFilter;
use crate::store::RecordStore;
use actix_web::{get, web, Responder, Result};
use uuid::Uuid;

#[tracing::instrument(name = "Get conversation.", skip(store))]
#[get("/{id}")]
pub async fn item(path: web::Path<(Uuid,)>, store: web::Data<RecordStore>) -> Result<impl Responder> {
    let conversation = store.get_conversation(path.0).await?;
    Ok(JsonResponse::build().set_item(conversation).ok("OK"))
}

/// GET /api/conversations?preset_id=&updated_before=&limit=&offset=
#[tracing::instrument(name = "List conversations.", skip(store))]
#[get("")]
pub async fn list(
    filter: web::Query<ConversationFilter>,
    store: web::Data<RecordStore>,
) -> Result<impl Responder> {
    let page = store.list_conversations(&filter).await;
    Ok(JsonResponse::build()
        .set_list(page.items)
        .set_total(page.total)
        .ok("OK"))
}
