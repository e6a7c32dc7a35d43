use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mesh_codec::{DiffEngine, EncodedMesh, XorDiff};
use stag_api::{DecodedMesh, Mesh, MeshError, MeshRecord, StagError};

use crate::cache::VersionCache;
use crate::config::PipelineConfig;

/// Источник payload'ов base-записей для восстановления delta при чтении.
pub trait PayloadSource: Send + Sync {
    /// Payload записи `id`. Отсутствие → `StagError::NotFound`.
    fn fetch_payload(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, StagError>> + Send + '_>>;
}

/// Результат `prepare`: готовая запись + отложенное обновление кэша.
///
/// Кэш меняется только в `IngestionPipeline::commit`, так что вызывающий
/// может сначала записать record в store и закоммитить только после
/// успешной записи.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub record: MeshRecord,
    cache_update: Option<Mesh>,
}

impl Prepared {
    fn passthrough(mesh: &Mesh) -> Self {
        Self {
            record: MeshRecord::passthrough(mesh),
            cache_update: None,
        }
    }

    /// Обновит ли commit кэш (false для empty / already-encoded).
    pub fn updates_cache(&self) -> bool {
        self.cache_update.is_some()
    }
}

// ═══════════════════════════════════════════════════════════════
//  IngestionPipeline
// ═══════════════════════════════════════════════════════════════

/// Codec + DiffEngine + VersionCache: решает full vs delta при записи
/// и разворачивает delta при чтении.
///
/// Каждый экземпляр владеет собственным кэшем.
pub struct IngestionPipeline {
    config: PipelineConfig,
    engine: Arc<dyn DiffEngine>,
    cache: VersionCache,
}

impl Default for IngestionPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl IngestionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_engine(config, Arc::new(XorDiff))
    }

    pub fn with_engine(config: PipelineConfig, engine: Arc<dyn DiffEngine>) -> Self {
        Self {
            config,
            engine,
            cache: VersionCache::new(),
        }
    }

    pub fn cache(&self) -> &VersionCache {
        &self.cache
    }

    fn encode(&self, mesh: &Mesh) -> Result<EncodedMesh, StagError> {
        mesh_codec::encode_mesh(mesh, self.config.default_compression_level)
    }

    /// Посчитать storage record для mesh'а, не трогая кэш.
    pub fn prepare(&self, mesh: &Mesh) -> Result<Prepared, MeshError> {
        if mesh.vertices.is_empty() {
            return Ok(Prepared::passthrough(mesh));
        }
        if mesh_codec::is_already_encoded(&mesh.vertices) {
            tracing::debug!(mesh = %mesh.id, "payload already encoded, passing through");
            return Ok(Prepared::passthrough(mesh));
        }

        let full = self
            .encode(mesh)
            .map_err(|e| MeshError::new(&mesh.id, e))?;

        let record = MeshRecord {
            id: mesh.id.clone(),
            anchor_id: mesh.anchor_id.clone(),
            payload: Vec::new(),
            is_delta: false,
            base_mesh_id: String::new(),
            compression_level: mesh.compression_level,
            timestamp: mesh.timestamp,
        };

        if !mesh.is_delta {
            if let Some(base) = self.delta_base(mesh) {
                match self.encode(&base) {
                    Ok(encoded_base) => {
                        let patch = self.engine.diff(&encoded_base.data, &full.data);
                        if patch.len() < full.data.len() {
                            tracing::debug!(
                                mesh = %mesh.id,
                                base = %base.id,
                                patch = patch.len(),
                                full = full.data.len(),
                                "storing delta"
                            );
                            return Ok(Prepared {
                                record: MeshRecord {
                                    payload: patch,
                                    is_delta: true,
                                    base_mesh_id: base.id,
                                    ..record
                                },
                                cache_update: Some(mesh.clone()),
                            });
                        }
                        tracing::debug!(
                            mesh = %mesh.id,
                            patch = patch.len(),
                            full = full.data.len(),
                            "delta not smaller, storing full"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(mesh = %mesh.id, base = %base.id, error = %e, "cached base failed to encode");
                    }
                }
            }
        }

        Ok(Prepared {
            record: MeshRecord {
                payload: full.data,
                ..record
            },
            cache_update: Some(mesh.clone()),
        })
    }

    /// Кэшированный mesh того же anchor'а, пригодный как base.
    fn delta_base(&self, mesh: &Mesh) -> Option<Mesh> {
        let base = self.cache.get(&mesh.anchor_id)?;
        if base.id.is_empty() || base.id == mesh.id {
            return None;
        }
        Some(base)
    }

    /// Применить отложенное обновление кэша и вернуть запись.
    pub fn commit(&self, prepared: Prepared) -> MeshRecord {
        if let Some(mesh) = prepared.cache_update {
            self.cache.put(mesh);
        }
        prepared.record
    }

    /// `prepare` + `commit`.
    pub fn process(&self, mesh: &Mesh) -> Result<MeshRecord, MeshError> {
        let prepared = self.prepare(mesh)?;
        Ok(self.commit(prepared))
    }

    /// Развернуть запись в вершины/грани.
    ///
    /// Delta разворачивается ровно на один шаг: если base сам является
    /// delta, декодирование упадёт с `StagError::Format`.
    pub async fn resolve(
        &self,
        record: &MeshRecord,
        source: &dyn PayloadSource,
    ) -> Result<DecodedMesh, MeshError> {
        let tag = |e: StagError| MeshError::new(&record.id, e);

        if !record.is_delta {
            return mesh_codec::decode(&record.payload).map_err(tag);
        }
        if record.base_mesh_id.is_empty() {
            return Err(tag(StagError::Format("delta record without base_mesh_id".into())));
        }

        let base = source
            .fetch_payload(&record.base_mesh_id)
            .await
            .map_err(tag)?;
        let full = self.engine.apply(&base, &record.payload).map_err(tag)?;
        mesh_codec::decode(&full).map_err(tag)
    }
}
