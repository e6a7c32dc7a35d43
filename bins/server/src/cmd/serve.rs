use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pipeline::{IngestionPipeline, MeshRepository};
use session_hub::SessionHub;
use stag_api::DocumentStore;
use stag_api_server::AppState;
use storage_memory::MemoryStore;

use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

/// Сколько ждём завершения задач после Ctrl+C.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("stag-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    let api_port = args.port.unwrap_or(config.api_port);
    tracing::info!(config = %args.config, port = api_port, "loaded config");

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Store + pipeline ---
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::with_config(config.storage));
    tracing::info!(store = store.name(), "document store ready");

    let pipeline = IngestionPipeline::new(config.pipeline);
    let repo = Arc::new(MeshRepository::new(store, pipeline));

    // --- Session hub ---
    let (hub, hub_handle) = SessionHub::spawn(config.hub, token.clone());

    // --- API server (HTTP + WS) ---
    let state = AppState::new(repo, hub).with_ws_read_limit(config.ws_read_limit);
    let mut api_handle = tokio::spawn(stag_api_server::run(api_port, state, token.clone()));

    tracing::info!("server ready");

    // --- Ожидание Ctrl+C или падения API ---
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down...");
        }
        result = &mut api_handle => {
            token.cancel();
            let _ = hub_handle.await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServerError::Api(e)),
                Err(e) => Err(ServerError::Api(e.to_string())),
            };
        }
    }

    // Hub закрывает все соединения, axum дожидается in-flight запросов
    token.cancel();

    if tokio::time::timeout(DRAIN_TIMEOUT, &mut api_handle).await.is_err() {
        tracing::warn!("api server did not stop in time, aborting");
        api_handle.abort();
    }
    let _ = hub_handle.await;

    tracing::info!("shutdown complete");
    Ok(())
}
