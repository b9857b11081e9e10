use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_api::config::Config;
use relay_api::db::accounts::{AccountStore, MemoryAccountStore};
use relay_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    tracing::info!(
        pong_wait = ?config.pong_wait,
        max_frame_bytes = config.max_frame_bytes,
        "relay-api configured"
    );

    let accounts: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
    let (state, hub) = AppState::new(config, accounts);
    let hub_handle = state.hub.clone();
    let hub_task = tokio::spawn(hub.run());

    let app = relay_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "relay-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    hub_handle.shutdown();
    let _ = hub_task.await;
    tracing::info!("relay-api stopped");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
