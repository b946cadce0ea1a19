use crate::errors::AppError;
use crate::helpers::JsonResponse;
use crate::services::ChatRelay;
use actix_web::{get, web, Responder, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

/// Models served by the upstream model server.
#[tracing::instrument(name = "List models.", skip(relay))]
#[get("/models")]
pub async fn list(relay: web::Data<ChatRelay>) -> Result<impl Responder> {
    let models = relay
        .model()
        .list_models()
        .await
        .map_err(|err| {
            tracing::error!("Failed to list models: {}", err);
            AppError::from(err)
        })?
        .into_iter()
        .map(|id| ModelInfo {
            name: id.clone(),
            id,
        })
        .collect();

    Ok(JsonResponse::build().set_list(models).ok("OK"))
}
