use crate::helpers::JsonResponse;
use crate::services::PresetRegistry;
use actix_web::{delete, web, Responder, Result};
use uuid::Uuid;

#[tracing::instrument(name = "Delete preset.", skip(registry))]
#[delete("/{id}")]
pub async fn item(path: web::Path<(Uuid,)>, registry: web::Data<PresetRegistry>) -> Result<impl Responder> {
    registry.delete(path.0).await?;
    Ok(JsonResponse::<()>::build().ok("Deleted"))
}
