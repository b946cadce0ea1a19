use crate::errors::AppError;
use crate::forms::MessageForm;
use crate::services::{ChatRelay, ServerFrame, SessionMultiplexer, TurnEvent, TurnRequest};
use crate::store::RecordStore;
use actix::{Actor, ActorContext, AsyncContext, Handler, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde_valid::Validate;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// WebSocket heartbeat interval
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Client timeout - close connection if no heartbeat received
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
/// Fragments buffered between the relay and the socket
const FRAGMENT_BUFFER: usize = 32;

/// One client attached to one conversation
pub struct ChatWebSocket {
    connection_id: Uuid,
    conversation_id: Uuid,
    relay: ChatRelay,
    multiplexer: Arc<SessionMultiplexer>,
    /// Parent of every turn started from this connection
    shutdown: CancellationToken,
    hb: Instant,
}

impl ChatWebSocket {
    pub fn new(conversation_id: Uuid, relay: ChatRelay, multiplexer: Arc<SessionMultiplexer>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            conversation_id,
            relay,
            multiplexer,
            shutdown: CancellationToken::new(),
            hb: Instant::now(),
        }
    }

    /// Start heartbeat process to check connection health
    fn hb(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(
                    connection_id = %act.connection_id,
                    "Chat WebSocket client heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }

    fn send_frame(&self, frame: &ServerFrame, ctx: &mut <Self as Actor>::Context) {
        match serde_json::to_string(frame) {
            Ok(text) => ctx.text(text),
            Err(err) => tracing::error!("Failed to encode websocket frame: {}", err),
        }
    }

    fn send_error(&self, err: &AppError, ctx: &mut <Self as Actor>::Context) {
        self.send_frame(&ServerFrame::from(err), ctx);
    }

    /// Admits and spawns a turn. Fragments go to this connection only, the
    /// stored messages to every connection of the conversation.
    fn start_turn(&self, form: MessageForm, ctx: &mut <Self as Actor>::Context) {
        let guard = match self.multiplexer.try_begin_turn(self.conversation_id) {
            Ok(guard) => guard,
            Err(err) => {
                self.send_error(&err, ctx);
                return;
            }
        };

        let conversation_id = self.conversation_id;
        let relay = self.relay.clone();
        let multiplexer = self.multiplexer.clone();
        let cancel = self.shutdown.child_token();
        let addr = ctx.address();
        let request = TurnRequest::new(conversation_id, form.message).with_preset(form.preset_id);

        actix::spawn(async move {
            let _guard = guard;
            let (sender, mut receiver) = mpsc::channel(FRAGMENT_BUFFER);

            let forward = async {
                while let Some(event) = receiver.recv().await {
                    match event {
                        TurnEvent::UserMessage(message) => {
                            multiplexer.broadcast(conversation_id, &ServerFrame::from(&message));
                        }
                        TurnEvent::Fragment(content) => {
                            if !addr.connected() {
                                break;
                            }
                            addr.do_send(ServerFrame::Stream { content });
                        }
                    }
                }
            };
            let (outcome, _) = tokio::join!(relay.run_turn(request, sender, cancel), forward);

            match (&outcome.assistant_message, &outcome.error) {
                (Some(message), _) => {
                    multiplexer.broadcast(conversation_id, &ServerFrame::from(message));
                }
                (None, Some(err)) => addr.do_send(ServerFrame::from(err)),
                (None, None) => {}
            }
        });
    }
}

impl Actor for ChatWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            connection_id = %self.connection_id,
            conversation_id = %self.conversation_id,
            "Chat WebSocket connection started"
        );
        self.multiplexer
            .register(self.conversation_id, self.connection_id, ctx.address().recipient());
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // stops any turn still streaming for this client
        self.shutdown.cancel();
        self.multiplexer
            .unregister(self.conversation_id, self.connection_id);
        tracing::info!(
            connection_id = %self.connection_id,
            conversation_id = %self.conversation_id,
            "Chat WebSocket connection closed"
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                let form = match serde_json::from_str::<MessageForm>(&text) {
                    Ok(form) => form,
                    Err(err) => {
                        tracing::warn!("Malformed chat frame: {}", err);
                        self.send_error(&AppError::Validation(format!("malformed frame: {}", err)), ctx);
                        return;
                    }
                };
                if let Err(errors) = form.validate() {
                    self.send_error(&AppError::Validation(errors.to_string()), ctx);
                    return;
                }

                self.start_turn(form, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary messages are not supported by the chat protocol");
                self.send_error(
                    &AppError::Validation("binary frames are not supported".to_string()),
                    ctx,
                );
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!("Chat WebSocket close received: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Err(err) => {
                tracing::warn!("Chat WebSocket protocol error: {}", err);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<ServerFrame> for ChatWebSocket {
    type Result = ();

    fn handle(&mut self, frame: ServerFrame, ctx: &mut Self::Context) {
        self.send_frame(&frame, ctx);
    }
}

/// WebSocket route handler: GET /ws/{conversation_id}
#[tracing::instrument(name = "Chat WebSocket connection", skip(req, stream, store, relay, multiplexer))]
pub async fn chat_websocket(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<(Uuid,)>,
    store: web::Data<RecordStore>,
    relay: web::Data<ChatRelay>,
    multiplexer: web::Data<Arc<SessionMultiplexer>>,
) -> Result<HttpResponse, Error> {
    let conversation_id = path.0;
    store.get_conversation(conversation_id).await?;

    let ws = ChatWebSocket::new(
        conversation_id,
        relay.get_ref().clone(),
        multiplexer.get_ref().clone(),
    );

    ws::start(ws, &req, stream)
}
