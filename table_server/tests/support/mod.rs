// One server per test binary, plus socket helpers shared by the integration tests.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

// Start the server on first use and return its base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // Own thread and runtime so the server outlives each #[tokio::test] runtime.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{}", addr));
                table_server::run(listener).await.expect("server failed");
            });
        });
        wait_for_server_url_and_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}

// Create a table over HTTP and return its id.
pub async fn create_table(extra: Value) -> String {
    let base_url = ensure_server();
    let table_id = format!("test-{}", uuid::Uuid::new_v4());
    let mut payload = serde_json::json!({ "table_id": table_id });
    if let (Some(body), Value::Object(extra)) = (payload.as_object_mut(), extra) {
        body.extend(extra);
    }

    let res = reqwest::Client::new()
        .post(format!("{base_url}/tables"))
        .json(&payload)
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), reqwest::StatusCode::CREATED);
    table_id
}

pub fn ws_url(table_id: &str) -> String {
    let base_url = ensure_server();
    let addr = base_url.strip_prefix("http://").expect("http base url");
    format!("ws://{addr}/ws?table_id={table_id}")
}

pub async fn send_json(socket: &mut Socket, value: Value) {
    socket
        .send(Message::text(value.to_string()))
        .await
        .expect("send should succeed");
}

// Read text frames until one satisfies `matches`, skipping everything else.
pub async fn next_matching(socket: &mut Socket, matches: impl Fn(&Value) -> bool) -> Value {
    let read = async {
        loop {
            let msg = socket
                .next()
                .await
                .expect("socket closed early")
                .expect("socket error");
            let Ok(text) = msg.to_text() else { continue };
            let Ok(value) = serde_json::from_str::<Value>(text) else {
                continue;
            };
            if matches(&value) {
                return value;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("expected message did not arrive in time")
}

pub fn is_type(value: &Value, ty: &str) -> bool {
    value["type"] == ty
}

pub fn is_reliable(value: &Value, kind: &str) -> bool {
    is_type(value, "Reliable") && value["data"]["kind"] == kind
}

// Connect, join, and return the socket with the assigned participant id.
pub async fn join(table_id: &str, display_name: &str) -> (Socket, u64) {
    let (mut socket, _) = connect_async(ws_url(table_id))
        .await
        .expect("websocket connect");
    send_json(
        &mut socket,
        serde_json::json!({ "type": "Join", "data": { "display_name": display_name } }),
    )
    .await;

    let identity = next_matching(&mut socket, |v| is_type(v, "Identity")).await;
    let participant_id = identity["data"]["participant_id"]
        .as_u64()
        .expect("participant id");
    (socket, participant_id)
}

// Client command message for one entity.
pub fn command(entity_id: u64, command: Value) -> Value {
    serde_json::json!({ "type": "Command", "data": { "entity_id": entity_id, "command": command } })
}

// Spawn a token and return its id once this socket sees the announcement.
pub async fn spawn_token(socket: &mut Socket, position: [f32; 3]) -> u64 {
    send_json(socket, serde_json::json!({ "type": "Spawn", "data": { "position": position } })).await;
    let spawned = next_matching(socket, |v| is_reliable(v, "spawned")).await;
    spawned["data"]["entity"]["id"].as_u64().expect("entity id")
}
