#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::Router;
use axum_test::TestServer;
use prost::Message as _;
use relay_common::packets::{message, JwtMessage, LoginRequestMessage, Message, RegisterRequestMessage};

use relay_api::config::Config;
use relay_api::db::accounts::{AccountStore, MemoryAccountStore};
use relay_api::AppState;

pub const TEST_SECRET: &str = "test-secret-do-not-use-in-production";
pub const TEST_PASSWORD: &str = "Sup3rSecretPass";

/// Build a test AppState with an in-memory account store and a running hub.
pub fn test_state() -> AppState {
    test_state_with(Config::with_secret(TEST_SECRET))
}

pub fn test_state_with(config: Config) -> AppState {
    let accounts: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
    let (state, hub) = AppState::new(config, accounts);
    tokio::spawn(hub.run());
    state
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    (relay_api::app(state.clone()), state)
}

/// Start an actual TCP server for WebSocket testing.
pub async fn start_server(config: Config) -> (SocketAddr, AppState) {
    let state = test_state_with(config);
    let app = relay_api::app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

// ---------------------------------------------------------------------------
// Protobuf helpers
// ---------------------------------------------------------------------------

pub fn encode(message: Message) -> Bytes {
    Bytes::from(message.encode_to_vec())
}

pub fn decode(bytes: &[u8]) -> Message {
    Message::decode(bytes).expect("protobuf response body")
}

pub fn register_body(username: &str, password: &str) -> Bytes {
    encode(Message {
        r#type: Some(message::Type::Register(RegisterRequestMessage {
            username: username.to_string(),
            password: password.to_string(),
        })),
    })
}

pub fn login_body(username: &str, password: &str) -> Bytes {
    encode(Message {
        r#type: Some(message::Type::Login(LoginRequestMessage {
            username: username.to_string(),
            password: password.to_string(),
        })),
    })
}

/// Register and log in a user over HTTP. Returns the issued token pair.
pub async fn signup(server: &TestServer, username: &str) -> JwtMessage {
    server
        .post("/register")
        .bytes(register_body(username, TEST_PASSWORD))
        .await
        .assert_status(StatusCode::CREATED);

    let resp = server.post("/login").bytes(login_body(username, TEST_PASSWORD)).await;
    resp.assert_status_ok();
    match decode(resp.as_bytes()).r#type {
        Some(message::Type::Jwt(jwt)) => jwt,
        other => panic!("expected jwt, got {other:?}"),
    }
}

/// Create a room over HTTP and return its id.
pub async fn create_room(server: &TestServer, access_token: &str, name: &str) -> u64 {
    let resp = server
        .post("/new-room")
        .add_header(AUTHORIZATION, format!("Bearer {access_token}"))
        .bytes(encode(Message {
            r#type: Some(message::Type::NewRoom(
                relay_common::packets::NewRoomRequestMessage {
                    name: name.to_string(),
                },
            )),
        }))
        .await;
    resp.assert_status_ok();
    match decode(resp.as_bytes()).r#type {
        Some(message::Type::NewRoomResponse(room)) => room.room_id,
        other => panic!("expected new room, got {other:?}"),
    }
}

/// Short pong wait so deadline tests finish quickly.
pub fn fast_config() -> Config {
    let mut config = Config::with_secret(TEST_SECRET);
    config.pong_wait = Duration::from_millis(500);
    config
}
