use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use pipeline::PipelineError;
use stag_api::{
    ErrorKind, HealthResponse, IngestResponse, MeshError, SpatialEvent, StagError, WsMessage,
    WsMessageType, now_ms,
};

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  Error mapping
// ═══════════════════════════════════════════════════════════════

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Shape | ErrorKind::Format => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::TransientStore => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Conflict => StatusCode::CONFLICT,
    }
}

fn error_response(status: StatusCode, error: &str, details: String) -> Response {
    let body = serde_json::json!({ "error": error, "details": details });
    (status, Json(body)).into_response()
}

fn bad_request(details: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, "validation", details.into())
}

fn stag_error(e: &StagError) -> Response {
    error_response(status_for(e.kind()), &e.kind().to_string(), e.to_string())
}

fn mesh_error(e: &MeshError) -> Response {
    tracing::warn!(mesh = %e.mesh_id, error = %e.source, "mesh request failed");
    error_response(status_for(e.kind()), &e.kind().to_string(), e.to_string())
}

fn pipeline_error(e: &PipelineError) -> Response {
    error_response(status_for(e.kind()), &e.kind().to_string(), e.to_string())
}

// ═══════════════════════════════════════════════════════════════
//  POST /api/v1/ingest
// ═══════════════════════════════════════════════════════════════

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Проставить отсутствующие id/timestamps. Anchors наследуют session события.
fn fill_defaults(event: &mut SpatialEvent) {
    if event.event_id.is_empty() {
        event.event_id = new_id();
    }
    if event.timestamp == 0 {
        event.timestamp = now_ms();
    }

    for anchor in &mut event.anchors {
        if anchor.id.is_empty() {
            anchor.id = new_id();
        }
        if anchor.session_id.is_empty() {
            anchor.session_id = event.session_id.clone();
        }
        if anchor.timestamp == 0 {
            anchor.timestamp = event.timestamp;
        }
    }

    for mesh in &mut event.meshes {
        if mesh.id.is_empty() {
            mesh.id = new_id();
        }
        if mesh.timestamp == 0 {
            mesh.timestamp = event.timestamp;
        }
    }
}

pub(crate) async fn handle_ingest(State(state): State<AppState>, body: Bytes) -> Response {
    let mut event: SpatialEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => return bad_request(format!("parse: {e}")),
    };
    if event.session_id.is_empty() {
        return bad_request("session_id is required");
    }
    fill_defaults(&mut event);

    let processed = match state.repo.ingest_event(&event).await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(session = %event.session_id, event = %event.event_id, error = %e, "ingest failed");
            return pipeline_error(&e);
        }
    };

    match serde_json::to_value(&event) {
        Ok(data) => {
            let message = WsMessage {
                r#type: WsMessageType::AnchorUpdate,
                session_id: Some(event.session_id.clone()),
                data,
                timestamp: now_ms(),
            };
            if let Err(e) = state.hub.broadcast(&event.session_id, message).await {
                tracing::warn!(session = %event.session_id, error = %e, "broadcast failed");
            }
        }
        Err(e) => tracing::warn!(event = %event.event_id, error = %e, "serialize event for broadcast"),
    }

    Json(IngestResponse {
        success: true,
        event_id: event.event_id,
        processed,
        message: None,
    })
    .into_response()
}

// ═══════════════════════════════════════════════════════════════
//  GET /api/v1/meshes/{id}?decompress=bool
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct MeshQueryParams {
    #[serde(default)]
    decompress: bool,
}

pub(crate) async fn handle_get_mesh(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<MeshQueryParams>,
) -> Response {
    let record = match state.repo.get_mesh(&id).await {
        Ok(record) => record,
        Err(e) => return stag_error(&e),
    };

    if !params.decompress {
        return Json(record).into_response();
    }
    match state.repo.decompress_record(&record).await {
        Ok(mesh) => Json(mesh).into_response(),
        Err(e) => mesh_error(&e),
    }
}

// ═══════════════════════════════════════════════════════════════
//  GET /api/v1/anchors/{id}
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_get_anchor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.repo.get_anchor(&id).await {
        Ok(anchor) => Json(anchor).into_response(),
        Err(e) => stag_error(&e),
    }
}

// ═══════════════════════════════════════════════════════════════
//  GET /api/v1/health
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let (status, code, stats) = match state.hub.stats().await {
        Ok(stats) => ("healthy", StatusCode::OK, stats),
        Err(_) => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE, Default::default()),
    };

    let response = HealthResponse {
        status: status.to_string(),
        timestamp: now_ms(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: state.repo.store().name().to_string(),
        sessions: stats.sessions,
        connections: stats.connections,
    };
    (code, Json(response))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use stag_api::{f32_to_bytes, u32_to_bytes};

    use super::*;
    use crate::tests::{call, get, post_json, state};

    fn b64(bytes: &[u8]) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn quad() -> (String, String) {
        let vertices = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        let faces = [0u32, 1, 2, 0, 2, 3];
        (b64(&f32_to_bytes(&vertices)), b64(&u32_to_bytes(&faces)))
    }

    #[tokio::test]
    async fn ingest_requires_session_id() {
        let (status, body) = call(&state(), post_json("/api/v1/ingest", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
    }

    #[tokio::test]
    async fn ingest_rejects_malformed_json() {
        let req = axum::http::Request::post("/api/v1/ingest")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let (status, _) = call(&state(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ingest_assigns_ids_and_broadcasts_to_session() {
        let state = state();
        let (conn, mut outbox) = state.hub.open_connection();
        state.hub.register(&conn, "s1").await.unwrap();

        let (vertices, faces) = quad();
        let event = json!({
            "session_id": "s1",
            "anchors": [{ "pose": { "x": 1.0, "y": 2.0, "z": 3.0 } }],
            "meshes": [{ "id": "m1", "anchor_id": "a", "vertices": vertices, "faces": faces }],
        });
        let (status, body) = call(&state, post_json("/api/v1/ingest", event)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["processed"], 2);
        let event_id = body["event_id"].as_str().unwrap();
        assert!(!event_id.is_empty());

        let msg = outbox.recv().await.unwrap();
        assert_eq!(msg.r#type, WsMessageType::AnchorUpdate);
        assert_eq!(msg.session_id.as_deref(), Some("s1"));
        assert_eq!(msg.data["event_id"], event_id);

        let anchor = &msg.data["anchors"][0];
        assert_eq!(anchor["session_id"], "s1");
        let anchor_id = anchor["id"].as_str().unwrap();
        let (status, stored) = call(&state, get(&format!("/api/v1/anchors/{anchor_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored["pose"]["z"], 3.0);
    }

    #[tokio::test]
    async fn bad_mesh_shape_is_400() {
        let event = json!({
            "session_id": "s1",
            "meshes": [{ "id": "m1", "anchor_id": "a", "vertices": b64(&[1, 2, 3]) }],
        });
        let (status, body) = call(&state(), post_json("/api/v1/ingest", event)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"].as_str().unwrap().contains("m1"));
    }

    #[tokio::test]
    async fn mesh_lookup_with_and_without_decompress() {
        let state = state();
        let (vertices, faces) = quad();
        let event = json!({
            "session_id": "s1",
            "meshes": [{ "id": "m1", "anchor_id": "a", "vertices": vertices, "faces": faces }],
        });
        call(&state, post_json("/api/v1/ingest", event)).await;

        let (status, record) = call(&state, get("/api/v1/meshes/m1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(record["payload"], json!(vertices));

        let (status, mesh) = call(&state, get("/api/v1/meshes/m1?decompress=true")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mesh["vertices"], json!(vertices));
        assert_eq!(mesh["faces"], json!(faces));
    }

    #[tokio::test]
    async fn duplicate_mesh_id_is_409() {
        let state = state();
        let (vertices, faces) = quad();
        let event = json!({
            "session_id": "s1",
            "meshes": [{ "id": "m1", "anchor_id": "a", "vertices": vertices, "faces": faces }],
        });
        let (status, _) = call(&state, post_json("/api/v1/ingest", event.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&state, post_json("/api/v1/ingest", event)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn missing_records_are_404() {
        let state = state();
        let (status, _) = call(&state, get("/api/v1/meshes/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&state, get("/api/v1/anchors/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_hub_stats() {
        let state = state();
        let (conn, _outbox) = state.hub.open_connection();
        state.hub.register(&conn, "s1").await.unwrap();

        let (status, body) = call(&state, get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "memory");
        assert_eq!(body["sessions"], 1);
        assert_eq!(body["connections"], 1);

        let (status, _) = call(&state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
