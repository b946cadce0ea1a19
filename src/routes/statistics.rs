use crate::helpers::JsonResponse;
use crate::models::Statistics;
use crate::services::{RetentionSweeper, SessionMultiplexer};
use crate::store::RecordStore;
use actix_web::{get, post, web, Responder, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct ServiceStatistics {
    #[serde(flatten)]
    pub store: Statistics,
    pub active_connections: usize,
    pub active_conversations: usize,
}

#[tracing::instrument(name = "Get statistics.", skip(store, multiplexer))]
#[get("/statistics")]
pub async fn statistics(
    store: web::Data<RecordStore>,
    multiplexer: web::Data<Arc<SessionMultiplexer>>,
) -> Result<impl Responder> {
    let statistics = ServiceStatistics {
        store: store.statistics().await,
        active_connections: multiplexer.connection_count(None),
        active_conversations: multiplexer.active_conversations().len(),
    };
    Ok(JsonResponse::build().set_item(statistics).ok("OK"))
}

#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    /// Falls back to the configured retention when absent
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub deleted: usize,
}

/// POST /api/cleanup?days=N
#[tracing::instrument(name = "Cleanup conversations.", skip(sweeper))]
#[post("/cleanup")]
pub async fn cleanup(
    query: web::Query<CleanupQuery>,
    sweeper: web::Data<RetentionSweeper>,
) -> Result<impl Responder> {
    let deleted = match query.days {
        Some(days) => sweeper.run_once(Some(days)).await,
        None => sweeper.sweep().await.map_err(|err| {
            tracing::error!("Retention policy unavailable: {}", err);
            JsonResponse::<CleanupResult>::build().bad_request("retention policy unavailable, pass ?days=N")
        })?,
    };

    Ok(JsonResponse::build()
        .set_item(CleanupResult { deleted })
        .ok(&format!("Deleted {} conversations", deleted)))
}
