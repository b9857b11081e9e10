//! WebSocket upgrade handler and per-connection setup.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocket;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::error::ApiError;
use crate::AppState;

use super::client::SocketSession;
use super::pump::{read_pump, write_pump};
use super::room::Room;
use super::session::ClientSession;

/// Query string of `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub token: String,
    pub room: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let user_id = state.auth.verify_access_token(&params.token)?;

    let room_id: u64 = params
        .room
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("room not provided"))?
        .parse()
        .map_err(|_| ApiError::bad_request("room must be a number"))?;
    let room = state
        .hub
        .rooms()
        .get(room_id)
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    let ws = ws.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let max_frame = state.config.max_frame_bytes;
    Ok(ws
        .max_message_size(max_frame)
        .max_frame_size(max_frame)
        .on_upgrade(move |socket| handle_connection(socket, state, user_id, room))
        .into_response())
}

/// Resolve the username, get admitted by the hub, then run both pumps.
async fn handle_connection(socket: WebSocket, state: AppState, user_id: String, room: Arc<Room>) {
    let username = match state.accounts.username_of(&user_id).await {
        Ok(name) => name,
        Err(err) => {
            tracing::warn!(%user_id, %err, "username lookup failed, using placeholder");
            format!("Client {user_id}")
        }
    };

    let (session, outbound) = SocketSession::new(user_id, username, room, state.hub.clone());
    if state.hub.register(session.clone()).await.is_none() {
        tracing::warn!(room_id = session.room_id(), "hub refused session");
        session.close("registration refused");
        return;
    }

    let (ws_tx, ws_rx) = socket.split();
    let pong_wait = state.config.pong_wait;
    tokio::spawn(write_pump(session.clone(), outbound, ws_tx, pong_wait));
    read_pump(session, ws_rx, pong_wait).await;
}
