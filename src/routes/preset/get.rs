use crate::helpers::JsonResponse;
use crate::services::PresetRegistry;
use actix_web::{get, web, Responder, Result};
use uuid::Uuid;

#[tracing::instrument(name = "List presets.", skip(registry))]
#[get("")]
pub async fn list(registry: web::Data<PresetRegistry>) -> Result<impl Responder> {
    Ok(JsonResponse::build().set_list(registry.list().await).ok("OK"))
}

#[tracing::instrument(name = "Get preset.", skip(registry))]
#[get("/{id}")]
pub async fn item(path: web::Path<(Uuid,)>, registry: web::Data<PresetRegistry>) -> Result<impl Responder> {
    let preset = registry.get(path.0).await?;
    Ok(JsonResponse::build().set_item(preset).ok("OK"))
}

/// Number of conversations referencing the preset
#[tracing::instrument(name = "Get preset usage.", skip(registry))]
#[get("/{id}/usage")]
pub async fn usage(path: web::Path<(Uuid,)>, registry: web::Data<PresetRegistry>) -> Result<impl Responder> {
    let usage = registry.usage(path.0).await?;
    Ok(JsonResponse::build().set_item(usage).ok("OK"))
}
