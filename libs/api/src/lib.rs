mod error;
mod store;
mod types;
mod util;

pub use error::{ErrorKind, MeshError, StagError};
pub use store::{ANCHORS_COLLECTION, DocumentStore, MESHES_COLLECTION};
pub use types::{
    Anchor, DecodedMesh, HealthResponse, IngestResponse, Mesh, MeshRecord, Pose,
    SpatialEvent, WsMessage, WsMessageType,
};
pub use util::{bytes_to_f32, bytes_to_u32, f32_to_bytes, now_ms, u32_to_bytes};

/// serde helper: `Vec<u8>` как base64-строка (как бинарные форматы в RecordData).
pub mod bytes_b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        match raw {
            Some(s) => base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}
