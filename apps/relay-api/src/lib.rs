pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::tokens::Authenticator;
use config::Config;
use db::accounts::AccountStore;
use gateway::hub::{Hub, HubHandle};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub auth: Arc<Authenticator>,
    pub accounts: Arc<dyn AccountStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire up state around a fresh hub. The returned [`Hub`] must be driven
    /// with [`Hub::run`].
    pub fn new(config: Config, accounts: Arc<dyn AccountStore>) -> (Self, Hub) {
        let (hub, handle) = Hub::new();
        let auth = Arc::new(Authenticator::from_config(&config, accounts.clone()));
        let state = Self {
            hub: handle,
            auth,
            accounts,
            config: Arc::new(config),
        };
        (state, hub)
    }
}

/// The full HTTP application: routes plus CORS and request tracing.
pub fn app(state: AppState) -> Router {
    let origins = if state.config.allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            state
                .config
                .allowed_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
