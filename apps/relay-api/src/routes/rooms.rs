use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use relay_common::packets::{message, Message, NewRoomResponseMessage};

use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::gateway::room::Room;
use crate::routes::proto::Protobuf;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(list_rooms))
        .route("/new-room", post(create_room))
}

fn room_summary(room: &Room) -> NewRoomResponseMessage {
    NewRoomResponseMessage {
        room_id: room.id,
        owner_id: room.owner_id.clone(),
        name: room.name.clone(),
    }
}

/// `GET|POST /rooms`: every room, ordered by id.
async fn list_rooms(State(state): State<AppState>, _user: AuthUser) -> Protobuf<Message> {
    let rooms = state
        .hub
        .rooms()
        .list()
        .iter()
        .map(|room| room_summary(room))
        .collect();
    Protobuf(Message::rooms(rooms))
}

/// `POST /new-room`: create a room owned by the caller.
async fn create_room(
    State(state): State<AppState>,
    user: AuthUser,
    Protobuf(body): Protobuf<Message>,
) -> Result<Protobuf<Message>, ApiError> {
    let Some(message::Type::NewRoom(req)) = body.r#type else {
        return Err(ApiError::bad_request("Message not supported"));
    };
    let name = req.name.trim();
    if name.is_empty() {
        return Ok(Protobuf(Message::deny("Room name must not be empty")));
    }

    let room = state.hub.rooms().create_room(&user.user_id, name);
    Ok(Protobuf(Message::new_room(room_summary(&room))))
}
