use crate::forms::PresetPatch;
use crate::helpers::JsonResponse;
use crate::services::PresetRegistry;
use actix_web::{put, web, Responder, Result};
use uuid::Uuid;

/// Partial update; fields left out keep their stored value.
#[tracing::instrument(name = "Update preset.", skip(registry))]
#[put("/{id}")]
pub async fn item(
    path: web::Path<(Uuid,)>,
    form: web::Json<PresetPatch>,
    registry: web::Data<PresetRegistry>,
) -> Result<impl Responder> {
    let preset = registry.update(path.0, form.into_inner()).await?;
    Ok(JsonResponse::build().set_item(preset).ok("Updated"))
}
