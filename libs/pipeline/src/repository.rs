use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use stag_api::{
    ANCHORS_COLLECTION, Anchor, DecodedMesh, DocumentStore, MESHES_COLLECTION, Mesh, MeshError,
    MeshRecord, SpatialEvent, StagError, f32_to_bytes, u32_to_bytes,
};

use crate::error::PipelineError;
use crate::ingest::{IngestionPipeline, PayloadSource};

// ═══════════════════════════════════════════════════════════════
//  MeshRepository — pipeline поверх document store
// ═══════════════════════════════════════════════════════════════

/// Связка IngestionPipeline + внешний store.
///
/// Ingest: anchors → upsert, meshes → prepare → put → commit.
/// Read: get по ключу, resolve delta через тот же store.
pub struct MeshRepository {
    store: Arc<dyn DocumentStore>,
    pipeline: IngestionPipeline,
}

impl MeshRepository {
    pub fn new(store: Arc<dyn DocumentStore>, pipeline: IngestionPipeline) -> Self {
        Self { store, pipeline }
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Принять событие целиком. Возвращает число обработанных anchors + meshes.
    ///
    /// Meshes обрабатываются по порядку; первая ошибка прерывает ingest,
    /// уже записанные записи остаются (каждая запись атомарна сама по себе).
    pub async fn ingest_event(&self, event: &SpatialEvent) -> Result<usize, PipelineError> {
        for anchor in &event.anchors {
            self.upsert_anchor(anchor)
                .await
                .map_err(|source| PipelineError::Anchor {
                    anchor_id: anchor.id.clone(),
                    source,
                })?;
        }

        for mesh in &event.meshes {
            self.ingest_mesh(mesh).await?;
        }

        tracing::debug!(
            session = %event.session_id,
            event = %event.event_id,
            anchors = event.anchors.len(),
            meshes = event.meshes.len(),
            "ingested event"
        );
        Ok(event.anchors.len() + event.meshes.len())
    }

    /// Закодировать и сохранить один mesh. Кэш обновляется только после
    /// успешной записи в store.
    ///
    /// Mesh records create-only: повторный id → `StagError::Conflict`,
    /// сохранённая запись не меняется.
    pub async fn ingest_mesh(&self, mesh: &Mesh) -> Result<MeshRecord, MeshError> {
        let prepared = self.pipeline.prepare(mesh)?;
        let tag = |e: StagError| MeshError::new(&mesh.id, e);

        let document = serde_json::to_value(&prepared.record).map_err(|e| tag(e.into()))?;
        self.store
            .insert(MESHES_COLLECTION, &mesh.id, document)
            .await
            .map_err(tag)?;

        Ok(self.pipeline.commit(prepared))
    }

    async fn upsert_anchor(&self, anchor: &Anchor) -> Result<(), StagError> {
        let document = serde_json::to_value(anchor)?;
        self.store.put(ANCHORS_COLLECTION, &anchor.id, document).await
    }

    pub async fn get_anchor(&self, id: &str) -> Result<Anchor, StagError> {
        let document = self.store.get(ANCHORS_COLLECTION, id).await?;
        Ok(serde_json::from_value(document)?)
    }

    pub async fn get_mesh(&self, id: &str) -> Result<MeshRecord, StagError> {
        let document = self.store.get(MESHES_COLLECTION, id).await?;
        Ok(serde_json::from_value(document)?)
    }

    pub async fn resolve(&self, record: &MeshRecord) -> Result<DecodedMesh, MeshError> {
        self.pipeline.resolve(record, self).await
    }

    /// Запись → wire mesh с сырыми байтами вершин/граней (query `decompress=true`).
    pub async fn decompress_record(&self, record: &MeshRecord) -> Result<Mesh, MeshError> {
        let mut mesh = Mesh {
            id: record.id.clone(),
            anchor_id: record.anchor_id.clone(),
            vertices: Vec::new(),
            faces: Vec::new(),
            is_delta: false,
            base_mesh_id: String::new(),
            compression_level: record.compression_level,
            timestamp: record.timestamp,
        };
        if record.payload.is_empty() {
            return Ok(mesh);
        }

        let decoded = self.resolve(record).await?;
        mesh.vertices = f32_to_bytes(&decoded.vertices);
        mesh.faces = u32_to_bytes(&decoded.faces);
        Ok(mesh)
    }
}

impl PayloadSource for MeshRepository {
    fn fetch_payload(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, StagError>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.get_mesh(&id).await?.payload) })
    }
}
