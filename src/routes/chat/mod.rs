pub mod models;
pub mod send;
pub mod websocket;

use crate::errors::AppError;
use crate::models::Message;
use crate::services::{ChatRelay, ServerFrame, SessionMultiplexer, TurnRequest};
use std::sync::Arc;

/// Runs a non-streaming turn under the conversation's turn guard and
/// broadcasts the stored messages to the conversation's websocket clients.
pub(crate) async fn relay_turn(
    relay: &ChatRelay,
    multiplexer: &Arc<SessionMultiplexer>,
    request: TurnRequest,
) -> Result<(Message, Message), AppError> {
    let conversation_id = request.conversation_id;
    let _guard = multiplexer.try_begin_turn(conversation_id)?;

    let (user_message, assistant_message) = relay.complete(request).await?;
    multiplexer.broadcast(conversation_id, &ServerFrame::from(&user_message));
    multiplexer.broadcast(conversation_id, &ServerFrame::from(&assistant_message));

    Ok((user_message, assistant_message))
}
