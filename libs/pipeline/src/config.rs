use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════
//  Pipeline Config
// ═══════════════════════════════════════════════════════════════

/// Настройки ingestion pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Уровень сжатия для mesh'ей, пришедших с `compression_level <= 0`.
    #[serde(default = "default_compression_level")]
    pub default_compression_level: i32,
}

fn default_compression_level() -> i32 {
    mesh_codec::DEFAULT_LEVEL as i32
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_compression_level: default_compression_level(),
        }
    }
}
