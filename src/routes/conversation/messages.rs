use crate::forms::MessageForm;
use crate::helpers::JsonResponse;
use crate::models::Message;
use crate::routes::chat::relay_turn;
use crate::services::{ChatRelay, SessionMultiplexer, TurnRequest};
use crate::store::RecordStore;
use actix_web::{get, post, web, Responder, Result};
use serde::Deserialize;
use serde_valid::Validate;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct Query {
    pub limit: Option<usize>,
}

/// GET /api/conversations/{id}/messages?limit=N
/// Messages in creation order; with `limit`, only the most recent N.
#[tracing::instrument(name = "List messages.", skip(store))]
#[get("/{id}/messages")]
pub async fn list(
    path: web::Path<(Uuid,)>,
    query: web::Query<Query>,
    store: web::Data<RecordStore>,
) -> Result<impl Responder> {
    let messages = store.list_messages(path.0, query.limit).await?;
    Ok(JsonResponse::build().set_list(messages).ok("OK"))
}

/// Runs a full turn and answers once the reply is committed. Both stored
/// messages are returned, user message first.
#[tracing::instrument(name = "Send message.", skip(form, relay, multiplexer))]
#[post("/{id}/messages")]
pub async fn add(
    path: web::Path<(Uuid,)>,
    form: web::Json<MessageForm>,
    relay: web::Data<ChatRelay>,
    multiplexer: web::Data<Arc<SessionMultiplexer>>,
) -> Result<impl Responder> {
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<Message>::build().form_error(errors.to_string()));
    }

    let form = form.into_inner();
    let request = TurnRequest::new(path.0, form.message).with_preset(form.preset_id);
    let (user_message, assistant_message) =
        relay_turn(relay.get_ref(), multiplexer.get_ref(), request).await?;

    Ok(JsonResponse::build()
        .set_list(vec![user_message, assistant_message])
        .created("Created"))
}
