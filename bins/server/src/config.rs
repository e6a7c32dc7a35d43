use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use pipeline::PipelineConfig;
use session_hub::HubConfig;
use storage_memory::MemoryStoreConfig;

#[derive(Parser)]
#[command(name = "stag-server", about = "Spatial anchor/mesh ingest и live-рассылка по сессиям")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить сервер
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config.toml", env = "CONFIG_PATH")]
    pub config: String,

    /// Переопределить `api_port` из конфига
    #[arg(long, env = "STAG_PORT")]
    pub port: Option<u16>,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Максимальный размер входящего WS сообщения (байты).
    #[serde(default = "default_ws_read_limit")]
    pub ws_read_limit: usize,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: MemoryStoreConfig,
}

fn default_api_port() -> u16 {
    8080
}
fn default_ws_read_limit() -> usize {
    stag_api_server::DEFAULT_WS_READ_LIMIT
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, crate::error::ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| crate::error::ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.ws_read_limit, 512);
        assert_eq!(config.hub.outbound_buffer, 256);
        assert_eq!(config.hub.ping_interval_secs, 54);
        assert_eq!(config.pipeline.default_compression_level, 9);
        assert_eq!(config.storage.max_documents, 1_000_000);
    }

    #[test]
    fn sections_override_defaults() {
        let config = ServerConfig::parse(
            r#"
            api_port = 9300
            ws_read_limit = 4096

            [hub]
            outbound_buffer = 8
            pong_wait_secs = 30

            [pipeline]
            default_compression_level = 3

            [storage]
            max_documents = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.api_port, 9300);
        assert_eq!(config.ws_read_limit, 4096);
        assert_eq!(config.hub.outbound_buffer, 8);
        assert_eq!(config.hub.pong_wait_secs, 30);
        assert_eq!(config.hub.write_wait_secs, 10);
        assert_eq!(config.pipeline.default_compression_level, 3);
        assert_eq!(config.storage.max_documents, 10);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ServerConfig::load("/nonexistent/stag.toml").unwrap_err();
        assert!(err.to_string().starts_with("config (read)"));
    }
}
