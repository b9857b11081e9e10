mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use relay_common::packets::{message, Message, NewRoomRequestMessage};

#[tokio::test]
async fn health_reports_room_count() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    state.hub.rooms().create_room("usr_owner", "lobby");

    let resp = server.get("/health").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["rooms"], 1);
}

#[tokio::test]
async fn created_rooms_are_listed_in_id_order() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let jwt = common::signup(&server, "owner").await;
    let owner_id = state.auth.verify_access_token(&jwt.access_token).unwrap();

    let first = common::create_room(&server, &jwt.access_token, "lobby").await;
    let second = common::create_room(&server, &jwt.access_token, "games").await;
    assert!(second > first);

    for request in [
        server.get("/rooms"),
        server.post("/rooms"),
    ] {
        let resp = request
            .add_header(AUTHORIZATION, format!("Bearer {}", jwt.access_token))
            .await;
        resp.assert_status_ok();
        let rooms = match common::decode(resp.as_bytes()).r#type {
            Some(message::Type::RoomsResponse(list)) => list.rooms,
            other => panic!("expected rooms, got {other:?}"),
        };
        let summary: Vec<(u64, &str, &str)> = rooms
            .iter()
            .map(|r| (r.room_id, r.owner_id.as_str(), r.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (first, owner_id.as_str(), "lobby"),
                (second, owner_id.as_str(), "games"),
            ]
        );
    }
}

#[tokio::test]
async fn blank_room_name_is_denied() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let jwt = common::signup(&server, "owner").await;

    let resp = server
        .post("/new-room")
        .add_header(AUTHORIZATION, format!("Bearer {}", jwt.access_token))
        .bytes(common::encode(Message {
            r#type: Some(message::Type::NewRoom(NewRoomRequestMessage {
                name: "   ".to_string(),
            })),
        }))
        .await;

    resp.assert_status_ok();
    assert!(matches!(
        common::decode(resp.as_bytes()).r#type,
        Some(message::Type::DenyResponse(_))
    ));
    assert!(state.hub.rooms().is_empty());
}

#[tokio::test]
async fn rooms_require_access_token() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    server.get("/rooms").await.assert_status(StatusCode::UNAUTHORIZED);
    server
        .get("/rooms")
        .add_header(AUTHORIZATION, "Bearer not-a-jwt")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
