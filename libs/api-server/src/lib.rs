mod http;
mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use pipeline::MeshRepository;
use session_hub::SessionHub;

pub const DEFAULT_WS_READ_LIMIT: usize = 512;

#[derive(Clone)]
pub struct AppState {
    repo: Arc<MeshRepository>,
    hub: SessionHub,
    ws_read_limit: usize,
}

impl AppState {
    pub fn new(repo: Arc<MeshRepository>, hub: SessionHub) -> Self {
        Self {
            repo,
            hub,
            ws_read_limit: DEFAULT_WS_READ_LIMIT,
        }
    }

    /// Максимальный размер входящего WS сообщения (байты).
    pub fn with_ws_read_limit(mut self, limit: usize) -> Self {
        self.ws_read_limit = limit.max(1);
        self
    }
}

/// Все маршруты под общими CORS (любой origin) и request-логированием.
/// `/health` и `/ws/{session_id}` — алиасы основных путей.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::handle_health))
        .route("/health", get(http::handle_health))
        .route("/api/v1/ingest", post(http::handle_ingest))
        .route("/api/v1/meshes/{id}", get(http::handle_get_mesh))
        .route("/api/v1/anchors/{id}", get(http::handle_get_anchor))
        .route("/stream/{session_id}", get(ws::handle_ws))
        .route("/ws/{session_id}", get(ws::handle_ws))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP + WebSocket API сервер.
pub async fn run(port: u16, state: AppState, shutdown: CancellationToken) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| format!("bind api :{port}: {e}"))?;
    tracing::info!(port, "api server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    Ok(())
}
