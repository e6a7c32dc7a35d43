use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Spatial types
// ════════════════════════════════════════════════════════════════

/// Положение anchor'а: позиция + ориентация (кватернион `[x, y, z, w]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub rotation: [f64; 4],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub pose: Pose,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Mesh в том виде, в каком его присылает producer.
///
/// `vertices` — little-endian f32, `faces` — little-endian u32.
/// После ingest'а `vertices` может содержать уже закодированный payload
/// (см. `MeshRecord`), `faces` тогда пустой.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub anchor_id: String,
    #[serde(default, with = "crate::bytes_b64")]
    pub vertices: Vec<u8>,
    #[serde(default, with = "crate::bytes_b64")]
    pub faces: Vec<u8>,
    #[serde(default)]
    pub is_delta: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_mesh_id: String,
    #[serde(default)]
    pub compression_level: i32,
    #[serde(default)]
    pub timestamp: i64,
}

/// Persisted unit. Создаётся один раз при ingest'е и больше не меняется.
///
/// `payload` — либо полный encoded mesh, либо delta patch (`is_delta`).
/// Для delta `base_mesh_id` всегда непустой.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshRecord {
    pub id: String,
    pub anchor_id: String,
    #[serde(with = "crate::bytes_b64")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub is_delta: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_mesh_id: String,
    #[serde(default)]
    pub compression_level: i32,
    #[serde(default)]
    pub timestamp: i64,
}

impl MeshRecord {
    /// Запись без перекодирования: payload берётся из `mesh.vertices` как есть.
    pub fn passthrough(mesh: &Mesh) -> Self {
        Self {
            id: mesh.id.clone(),
            anchor_id: mesh.anchor_id.clone(),
            payload: mesh.vertices.clone(),
            is_delta: mesh.is_delta,
            base_mesh_id: mesh.base_mesh_id.clone(),
            compression_level: mesh.compression_level,
            timestamp: mesh.timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialEvent {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub anchors: Vec<Anchor>,
    #[serde(default)]
    pub meshes: Vec<Mesh>,
}

/// Результат декодирования: плоские массивы `[x, y, z, ...]` и `[a, b, c, ...]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedMesh {
    pub vertices: Vec<f32>,
    pub faces: Vec<u32>,
    pub success: bool,
}

// ════════════════════════════════════════════════════════════════
//  WebSocket protocol
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    AnchorUpdate,
    MeshUpdate,
    Error,
    Ping,
    Pong,
}

impl std::fmt::Display for WsMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WsMessageType::AnchorUpdate => f.write_str("anchor_update"),
            WsMessageType::MeshUpdate => f.write_str("mesh_update"),
            WsMessageType::Error => f.write_str("error"),
            WsMessageType::Ping => f.write_str("ping"),
            WsMessageType::Pong => f.write_str("pong"),
        }
    }
}

/// Типизированное сообщение, которым hub обменивается с подписчиками.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    pub r#type: WsMessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: i64,
}

impl WsMessage {
    pub fn pong() -> Self {
        Self {
            r#type: WsMessageType::Pong,
            session_id: None,
            data: serde_json::Value::Null,
            timestamp: crate::now_ms(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            r#type: WsMessageType::Error,
            session_id: None,
            data: serde_json::Value::String(msg.into()),
            timestamp: crate::now_ms(),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  HTTP responses
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    pub event_id: String,
    pub processed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub database: String,
    pub sessions: usize,
    pub connections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_message_type_is_snake_case_on_the_wire() {
        let msg = WsMessage {
            r#type: WsMessageType::AnchorUpdate,
            session_id: Some("s1".into()),
            data: serde_json::json!({"k": 1}),
            timestamp: 42,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "anchor_update");
        assert_eq!(json["session_id"], "s1");

        let ping: WsMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping.r#type, WsMessageType::Ping);
        assert_eq!(ping.session_id, None);
    }

    #[test]
    fn mesh_bytes_travel_as_base64() {
        let mesh = Mesh {
            id: "m1".into(),
            vertices: vec![0, 0, 128, 63],
            ..Default::default()
        };
        let json = serde_json::to_value(&mesh).unwrap();
        assert_eq!(json["vertices"], "AACAPw==");
        assert!(json.get("base_mesh_id").is_none());

        let back: Mesh = serde_json::from_value(json).unwrap();
        assert_eq!(back, mesh);
    }

    #[test]
    fn spatial_event_fields_default_when_missing() {
        let event: SpatialEvent = serde_json::from_str(r#"{"session_id":"s"}"#).unwrap();
        assert!(event.event_id.is_empty());
        assert!(event.anchors.is_empty());
        assert!(event.meshes.is_empty());
    }
}
