use crate::errors::AppError;
use crate::helpers::JsonResponse;
use crate::store::RecordStore;
use actix_web::{delete, web, Responder, Result};
use uuid::Uuid;

#[tracing::instrument(name = "Delete conversation.", skip(store))]
#[delete("/{id}")]
pub async fn item(path: web::Path<(Uuid,)>, store: web::Data<RecordStore>) -> Result<impl Responder> {
    let id = path.0;
    if !store.delete_conversation(id).await? {
        return Err(AppError::conversation_not_found(id).into());
    }

    Ok(JsonResponse::<()>::build().ok("Deleted"))
}
