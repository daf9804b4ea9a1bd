//! In-process stand-in for the Bot API.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicI32, Ordering},
    },
    time::Duration,
};

use {
    axum::{Json, Router, body::Bytes, extract::State, http::Uri, routing::post},
    serde_json::{Value, json},
    teloxide::Bot,
    tokio::{sync::oneshot, task::JoinHandle},
};

#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub method: String,
    pub body: String,
    assigned_message_id: Option<i32>,
}

impl CapturedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }

    pub fn response_message_id(&self) -> i32 {
        self.assigned_message_id.expect("request produced no message")
    }
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    scripted: Arc<Mutex<HashMap<String, VecDeque<Value>>>>,
    updates: Arc<Mutex<VecDeque<Value>>>,
    next_message_id: Arc<AtomicI32>,
}

pub(crate) struct MockBotApi {
    state: MockState,
    url: url::Url,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
}

impl MockBotApi {
    pub async fn start() -> Self {
        let state = MockState {
            next_message_id: Arc::new(AtomicI32::new(100)),
            ..Default::default()
        };
        let app = Router::new()
            .route("/{*path}", post(telegram_api_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });

        let url = url::Url::parse(&format!("http://{addr}/")).expect("parse api url");
        Self {
            state,
            url,
            shutdown,
            server,
        }
    }

    pub fn bot(&self) -> Bot {
        Bot::new("test-token").set_api_url(self.url.clone())
    }

    /// Answer the next call to `method` with `response` instead of success.
    pub fn fail_next(&self, method: &str, response: Value) {
        self.state
            .scripted
            .lock()
            .expect("scripted lock")
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue an update for the next `GetUpdates` call.
    pub fn push_update(&self, update: Value) {
        self.state
            .updates
            .lock()
            .expect("updates lock")
            .push_back(update);
    }

    pub fn calls(&self, method: &str) -> Vec<CapturedRequest> {
        self.state
            .requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        self.server.await.expect("server join");
    }
}

pub(crate) fn api_error(code: u16, description: &str) -> Value {
    json!({ "ok": false, "error_code": code, "description": description })
}

pub(crate) fn retry_after(secs: u32) -> Value {
    json!({
        "ok": false,
        "error_code": 429,
        "description": format!("Too Many Requests: retry after {secs}"),
        "parameters": { "retry_after": secs }
    })
}

/// A private-chat text message as the Bot API delivers it.
pub(crate) fn text_message(message_id: i32, chat_id: i64, username: &str, text: &str) -> Value {
    json!({
        "message_id": message_id,
        "date": 1,
        "chat": { "id": chat_id, "type": "private", "first_name": "Alice" },
        "from": {
            "id": 1001,
            "is_bot": false,
            "first_name": "Alice",
            "username": username
        },
        "text": text
    })
}

async fn telegram_api_handler(
    State(state): State<MockState>,
    uri: Uri,
    body: Bytes,
) -> Json<Value> {
    let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
    let scripted = state
        .scripted
        .lock()
        .expect("scripted lock")
        .get_mut(&method)
        .and_then(VecDeque::pop_front);
    let assigned_message_id = match (&scripted, method.as_str()) {
        (None, "SendMessage" | "EditMessageText" | "SendDocument") => {
            Some(state.next_message_id.fetch_add(1, Ordering::SeqCst))
        },
        _ => None,
    };

    // Recorded before answering so a poll cut short by shutdown is still seen.
    state
        .requests
        .lock()
        .expect("requests lock")
        .push(CapturedRequest {
            method: method.clone(),
            body: String::from_utf8_lossy(&body).to_string(),
            assigned_message_id,
        });

    if let Some(response) = scripted {
        return Json(response);
    }
    let result = match (method.as_str(), assigned_message_id) {
        ("GetMe", _) => json!({
            "id": 1,
            "is_bot": true,
            "first_name": "ferry",
            "username": "ferry_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
            "can_connect_to_business": false,
            "has_main_web_app": false
        }),
        ("GetUpdates", _) => {
            let updates: Vec<Value> = state.updates.lock().expect("updates lock").drain(..).collect();
            if updates.is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            json!(updates)
        },
        (_, Some(id)) => json!({
            "message_id": id,
            "date": 0,
            "chat": { "id": 42, "type": "private" },
            "text": "ok"
        }),
        _ => json!(true),
    };
    Json(json!({ "ok": true, "result": result }))
}
