pub mod auth;
pub mod health;
pub mod proto;
pub mod rooms;

use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(rooms::router())
        .merge(crate::gateway::server::router())
}
