mod common;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Next JSON text frame, skipping control frames.
async fn next_frame(socket: &mut WsStream) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Socket closed")
            .expect("Socket error");
        if let WsMessage::Text(text) = message {
            return serde_json::from_str(&text).expect("Frame is not JSON");
        }
    }
}

async fn send(socket: &mut WsStream, body: Value) {
    socket
        .send(WsMessage::Text(body.to_string()))
        .await
        .expect("Failed to send frame");
}

#[tokio::test]
async fn turn_streams_fragments_between_the_two_messages() {
    let app = common::spawn_app().await;
    common::mock_completion(&app.model_server, &["Hel", "lo"], None).await;
    let id = app.create_conversation("Live").await;

    let (mut socket, _) = connect_async(app.ws_url(&id)).await.expect("Failed to connect");
    send(&mut socket, json!({"message": "Hi"})).await;

    let user = next_frame(&mut socket).await;
    assert_eq!(user["type"], "message");
    assert_eq!(user["sender"], "user");
    assert_eq!(user["content"], "Hi");

    let mut streamed = String::new();
    let assistant = loop {
        let frame = next_frame(&mut socket).await;
        match frame["type"].as_str() {
            Some("stream") => streamed.push_str(frame["content"].as_str().unwrap()),
            _ => break frame,
        }
    };
    assert_eq!(streamed, "Hello");
    assert_eq!(assistant["type"], "message");
    assert_eq!(assistant["sender"], "assistant");
    assert_eq!(assistant["content"], "Hello");

    let stored = app
        .store
        .list_messages(id.parse().unwrap(), None)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn committed_messages_reach_every_connection() {
    let app = common::spawn_app().await;
    common::mock_completion(&app.model_server, &["pong"], None).await;
    let id = app.create_conversation("Shared").await;

    let (mut sender, _) = connect_async(app.ws_url(&id)).await.unwrap();
    let (mut watcher, _) = connect_async(app.ws_url(&id)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    send(&mut sender, json!({"message": "ping"})).await;

    let user = next_frame(&mut watcher).await;
    assert_eq!(user["sender"], "user");
    // the watcher gets no fragments
    let assistant = next_frame(&mut watcher).await;
    assert_eq!(assistant["type"], "message");
    assert_eq!(assistant["content"], "pong");
}

#[tokio::test]
async fn malformed_frame_gets_an_error_frame() {
    let app = common::spawn_app().await;
    let id = app.create_conversation("Noise").await;

    let (mut socket, _) = connect_async(app.ws_url(&id)).await.unwrap();
    socket
        .send(WsMessage::Text("not json".to_string()))
        .await
        .unwrap();

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["code"], 400);

    // the connection survives
    send(&mut socket, json!({"message": ""})).await;
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "error");
}

#[tokio::test]
async fn upstream_failure_is_reported_to_the_sender() {
    let app = common::spawn_app().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .respond_with(wiremock::ResponseTemplate::new(500))
        .mount(&app.model_server)
        .await;
    let id = app.create_conversation("Down").await;

    let (mut socket, _) = connect_async(app.ws_url(&id)).await.unwrap();
    send(&mut socket, json!({"message": "hello?"})).await;

    let user = next_frame(&mut socket).await;
    assert_eq!(user["sender"], "user");
    let error = next_frame(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], 502);
}

#[tokio::test]
async fn unknown_conversation_is_rejected() {
    let app = common::spawn_app().await;

    let result = connect_async(app.ws_url(&uuid::Uuid::new_v4().to_string())).await;
    assert!(result.is_err());
}
