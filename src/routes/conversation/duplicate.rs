use crate::forms::DuplicateForm;
use crate::helpers::JsonResponse;
use crate::models::Conversation;
use crate::store::RecordStore;
use actix_web::{post, web, Responder, Result};
use serde_valid::Validate;
use uuid::Uuid;

/// POST /api/conversations/{id}/duplicate, body `{"title": ...}` optional
#[tracing::instrument(name = "Duplicate conversation.", skip(store))]
#[post("/{id}/duplicate")]
pub async fn item(
    path: web::Path<(Uuid,)>,
    form: Option<web::Json<DuplicateForm>>,
    store: web::Data<RecordStore>,
) -> Result<impl Responder> {
    let form = form.map(web::Json::into_inner).unwrap_or_default();
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<Conversation>::build().form_error(errors.to_string()));
    }

    let copy = store.duplicate_conversation(path.0, form.title).await?;
    Ok(JsonResponse::build().set_item(copy).created("Duplicated"))
}
