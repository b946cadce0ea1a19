//! Session Multiplexer
//!
//! Tracks the websocket connections attached to each conversation and admits
//! at most one in-flight turn per conversation.

use crate::errors::AppError;
use crate::models::{Message, Role};
use actix::Recipient;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Frame pushed to websocket clients
#[derive(Debug, Clone, PartialEq, Serialize, actix::Message)]
#[rtype(result = "()")]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// A committed user or assistant message
    Message {
        id: Uuid,
        sender: Role,
        content: String,
        created_at: DateTime<Utc>,
    },
    /// Fragment of the answer being generated
    Stream { content: String },
    Error { code: u16, message: String },
}

impl From<&Message> for ServerFrame {
    fn from(message: &Message) -> Self {
        ServerFrame::Message {
            id: message.id,
            sender: message.role,
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }
}

impl From<&AppError> for ServerFrame {
    fn from(err: &AppError) -> Self {
        use actix_web::ResponseError;
        let message = match err {
            AppError::Storage(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        ServerFrame::Error {
            code: err.status_code().as_u16(),
            message,
        }
    }
}

#[derive(Default)]
struct Sessions {
    /// conversation id -> connection id -> connection
    connections: HashMap<Uuid, HashMap<Uuid, Recipient<ServerFrame>>>,
    in_flight: HashSet<Uuid>,
}

#[derive(Default)]
pub struct SessionMultiplexer {
    sessions: Mutex<Sessions>,
}

/// Admission to run a turn. Dropping the guard releases the conversation.
#[must_use]
pub struct TurnGuard {
    multiplexer: Arc<SessionMultiplexer>,
    conversation_id: Uuid,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.multiplexer.lock().in_flight.remove(&self.conversation_id);
        tracing::debug!(conversation_id = %self.conversation_id, "Turn released");
    }
}

impl SessionMultiplexer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Sessions> {
        // a panic while holding the lock leaves the maps consistent
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, conversation_id: Uuid, connection_id: Uuid, recipient: Recipient<ServerFrame>) {
        self.lock()
            .connections
            .entry(conversation_id)
            .or_default()
            .insert(connection_id, recipient);
        tracing::info!(%conversation_id, %connection_id, "Connection attached");
    }

    pub fn unregister(&self, conversation_id: Uuid, connection_id: Uuid) {
        let mut sessions = self.lock();
        if let Some(connections) = sessions.connections.get_mut(&conversation_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                sessions.connections.remove(&conversation_id);
            }
        }
        tracing::info!(%conversation_id, %connection_id, "Connection detached");
    }

    /// Admits a turn unless one is already running for the conversation.
    pub fn try_begin_turn(self: &Arc<Self>, conversation_id: Uuid) -> Result<TurnGuard, AppError> {
        if !self.lock().in_flight.insert(conversation_id) {
            return Err(AppError::Conflict(format!(
                "a reply is already being generated for conversation {}",
                conversation_id
            )));
        }

        Ok(TurnGuard {
            multiplexer: Arc::clone(self),
            conversation_id,
        })
    }

    pub fn is_busy(&self, conversation_id: Uuid) -> bool {
        self.lock().in_flight.contains(&conversation_id)
    }

    /// Sends the frame to every live connection of the conversation and
    /// forgets connections whose actor has stopped.
    pub fn broadcast(&self, conversation_id: Uuid, frame: &ServerFrame) -> usize {
        let mut sessions = self.lock();
        let Some(connections) = sessions.connections.get_mut(&conversation_id) else {
            return 0;
        };

        connections.retain(|_, recipient| recipient.connected());
        for recipient in connections.values() {
            recipient.do_send(frame.clone());
        }
        let delivered = connections.len();
        if connections.is_empty() {
            sessions.connections.remove(&conversation_id);
        }

        delivered
    }

    /// Live connections for one conversation, or across all of them.
    pub fn connection_count(&self, conversation_id: Option<Uuid>) -> usize {
        let sessions = self.lock();
        match conversation_id {
            Some(id) => sessions.connections.get(&id).map_or(0, HashMap::len),
            None => sessions.connections.values().map(HashMap::len).sum(),
        }
    }

    pub fn active_conversations(&self) -> Vec<Uuid> {
        self.lock().connections.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix::{Actor, Context, Handler};

    #[derive(Default)]
    struct Collector {
        frames: Vec<ServerFrame>,
    }

    impl Actor for Collector {
        type Context = Context<Self>;
    }

    impl Handler<ServerFrame> for Collector {
        type Result = ();

        fn handle(&mut self, frame: ServerFrame, _ctx: &mut Self::Context) {
            self.frames.push(frame);
        }
    }

    #[derive(actix::Message)]
    #[rtype(result = "Vec<ServerFrame>")]
    struct Frames;

    impl Handler<Frames> for Collector {
        type Result = actix::MessageResult<Frames>;

        fn handle(&mut self, _msg: Frames, _ctx: &mut Self::Context) -> Self::Result {
            actix::MessageResult(self.frames.clone())
        }
    }

    #[test]
    fn test_second_turn_conflicts_until_guard_dropped() {
        let multiplexer = SessionMultiplexer::new();
        let conversation_id = Uuid::new_v4();

        let guard = multiplexer.try_begin_turn(conversation_id).unwrap();
        assert!(multiplexer.is_busy(conversation_id));
        assert!(matches!(
            multiplexer.try_begin_turn(conversation_id),
            Err(AppError::Conflict(_))
        ));
        // other conversations are independent
        let other = multiplexer.try_begin_turn(Uuid::new_v4()).unwrap();

        drop(guard);
        assert!(!multiplexer.is_busy(conversation_id));
        assert!(multiplexer.try_begin_turn(conversation_id).is_ok());
        drop(other);
    }

    #[actix_web::test]
    async fn test_broadcast_reaches_every_attached_connection() {
        let multiplexer = SessionMultiplexer::new();
        let conversation_id = Uuid::new_v4();
        let first = Collector::default().start();
        let second = Collector::default().start();
        let elsewhere = Collector::default().start();

        multiplexer.register(conversation_id, Uuid::new_v4(), first.clone().recipient());
        multiplexer.register(conversation_id, Uuid::new_v4(), second.clone().recipient());
        multiplexer.register(Uuid::new_v4(), Uuid::new_v4(), elsewhere.clone().recipient());
        assert_eq!(multiplexer.connection_count(Some(conversation_id)), 2);
        assert_eq!(multiplexer.connection_count(None), 3);

        let frame = ServerFrame::Stream {
            content: "hi".to_string(),
        };
        assert_eq!(multiplexer.broadcast(conversation_id, &frame), 2);

        assert_eq!(first.send(Frames).await.unwrap(), vec![frame.clone()]);
        assert_eq!(second.send(Frames).await.unwrap(), vec![frame]);
        assert!(elsewhere.send(Frames).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_unregister_forgets_connection() {
        let multiplexer = SessionMultiplexer::new();
        let conversation_id = Uuid::new_v4();
        let connection_id = Uuid::new_v4();
        let collector = Collector::default().start();

        multiplexer.register(conversation_id, connection_id, collector.recipient());
        assert_eq!(multiplexer.active_conversations(), vec![conversation_id]);

        multiplexer.unregister(conversation_id, connection_id);
        assert_eq!(multiplexer.connection_count(None), 0);
        assert!(multiplexer.active_conversations().is_empty());
        assert_eq!(
            multiplexer.broadcast(conversation_id, &ServerFrame::Stream { content: "x".into() }),
            0
        );
    }

    #[test]
    fn test_frames_serialize_with_type_tag() {
        let frame = ServerFrame::from(&AppError::Conflict("busy".into()));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], 409);

        let json = serde_json::to_value(ServerFrame::Stream { content: "a".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "stream", "content": "a"}));
    }
}
