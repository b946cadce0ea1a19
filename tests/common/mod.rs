#![allow(dead_code)]

use chatrelay::configuration::{ModelSettings, RetentionSettings, Settings, StorageSettings};
use chatrelay::connectors::LmStudioClient;
use chatrelay::services::FixedPolicy;
use chatrelay::startup::{run, AppState};
use chatrelay::store::RecordStore;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: RecordStore,
    /// Stands in for the LM Studio server
    pub model_server: MockServer,
    pub client: reqwest::Client,
    _data_dir: TempDir,
}

pub fn test_settings(model_url: String, data_dir: &Path) -> Settings {
    Settings {
        app_host: "127.0.0.1".to_string(),
        app_port: 0,
        storage: StorageSettings {
            data_dir: data_dir.to_path_buf(),
            seed_default_presets: false,
        },
        model: ModelSettings {
            base_url: model_url,
            model: Some("test-model".to_string()),
            connect_timeout_secs: 2,
            request_timeout_secs: 5,
            idle_timeout_secs: 5,
            context_messages: None,
        },
        retention: RetentionSettings {
            max_age_days: Some(30),
            cleanup_interval_hours: 24,
            retry_interval_secs: 60,
        },
    }
}

// the server runs on its own workers, the test only talks HTTP to it
pub async fn spawn_app() -> TestApp {
    let model_server = MockServer::start().await;
    let data_dir = tempfile::tempdir().expect("Failed to create data dir");
    let settings = test_settings(model_server.uri(), data_dir.path());

    let store = RecordStore::open(data_dir.path())
        .await
        .expect("Failed to open record store");
    let model = LmStudioClient::new(settings.model.clone()).expect("Failed to build model client");
    let state = AppState::new(
        store.clone(),
        Arc::new(model),
        Arc::new(FixedPolicy(settings.retention.max_age_days)),
        &settings,
    );

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let server = run(listener, state, settings)
        .await
        .expect("Failed to bind address.");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        port,
        store,
        model_server,
        client: reqwest::Client::new(),
        _data_dir: data_dir,
    }
}

impl TestApp {
    pub fn ws_url(&self, conversation_id: &str) -> String {
        format!("ws://127.0.0.1:{}/ws/{}", self.port, conversation_id)
    }

    pub async fn post_json(&self, route: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, route))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get(&self, route: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, route))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn put_json(&self, route: &str, body: Value) -> reqwest::Response {
        self.client
            .put(format!("{}{}", self.address, route))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn delete(&self, route: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.address, route))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Creates a conversation over the API and returns its id.
    pub async fn create_conversation(&self, title: &str) -> String {
        let response = self
            .post_json("/api/conversations", json!({ "title": title }))
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        body["item"]["id"].as_str().unwrap().to_string()
    }
}

/// OpenAI style SSE body streaming `fragments`, a usage chunk and `[DONE]`.
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let chunk = json!({"choices": [{"index": 0, "delta": {"content": fragment}}]});
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    let usage = json!({
        "choices": [],
        "usage": {"prompt_tokens": 12, "completion_tokens": fragments.len(), "total_tokens": 12 + fragments.len()}
    });
    body.push_str(&format!("data: {}\n\n", usage));
    body.push_str("data: [DONE]\n\n");
    body
}

pub async fn mock_completion(server: &MockServer, fragments: &[&str], delay: Option<Duration>) {
    let mut template = ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(sse_body(fragments));
    if let Some(delay) = delay {
        template = template.set_delay(delay);
    }

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(template)
        .mount(server)
        .await;
}
