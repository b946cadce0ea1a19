use crate::forms::PresetForm;
use crate::helpers::JsonResponse;
use crate::services::PresetRegistry;
use actix_web::{post, web, Responder, Result};

#[tracing::instrument(name = "Add preset.", skip(registry))]
#[post("")]
pub async fn item(
    form: web::Json<PresetForm>,
    registry: web::Data<PresetRegistry>,
) -> Result<impl Responder> {
    let preset = registry.create(form.into_inner()).await?;
    Ok(JsonResponse::build().set_item(preset).created("Created"))
}
