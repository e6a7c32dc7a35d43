use std::future::Future;
use std::pin::Pin;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use session_hub::{Frame, FrameReader, FrameWriter, HubError, serve_connection};
use stag_api::WsMessage;

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  WebSocket: /stream/{session_id} (алиас /ws/{session_id})
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_ws(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.max_message_size(state.ws_read_limit)
        .on_upgrade(move |socket| {
            let (sink, stream) = socket.split();
            serve_connection(hub, session_id, WsReader(stream), WsWriter(sink))
        })
}

// ═══════════════════════════════════════════════════════════════
//  Socket halves → hub frames
// ═══════════════════════════════════════════════════════════════

struct WsReader(SplitStream<WebSocket>);

struct WsWriter(SplitSink<WebSocket, Message>);

fn transport(e: impl std::fmt::Display) -> HubError {
    HubError::Transport(e.to_string())
}

/// Text → `WsMessage`; нераспознанный JSON и binary пропускаются.
fn decode(msg: Message) -> Option<Frame> {
    match msg {
        Message::Text(text) => match serde_json::from_str::<WsMessage>(text.as_str()) {
            Ok(msg) => Some(Frame::Message(msg)),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable client message");
                None
            }
        },
        Message::Binary(_) => None,
        Message::Ping(_) => Some(Frame::Ping),
        Message::Pong(_) => Some(Frame::Pong),
        Message::Close(_) => Some(Frame::Close),
    }
}

fn encode(frame: Frame) -> Result<Message, HubError> {
    Ok(match frame {
        Frame::Message(msg) => Message::Text(serde_json::to_string(&msg).map_err(transport)?.into()),
        Frame::Ping => Message::Ping(Bytes::new()),
        Frame::Pong => Message::Pong(Bytes::new()),
        Frame::Close => Message::Close(None),
    })
}

impl FrameReader for WsReader {
    fn next_frame(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Option<Result<Frame, HubError>>> + Send + '_>> {
        Box::pin(async move {
            loop {
                match self.0.next().await? {
                    Ok(msg) => {
                        if let Some(frame) = decode(msg) {
                            return Some(Ok(frame));
                        }
                    }
                    Err(e) => return Some(Err(transport(e))),
                }
            }
        })
    }
}

impl FrameWriter for WsWriter {
    fn write_frame(
        &mut self,
        frame: Frame,
    ) -> Pin<Box<dyn Future<Output = Result<(), HubError>> + Send + '_>> {
        Box::pin(async move {
            let msg = encode(frame)?;
            self.0.send(msg).await.map_err(transport)
        })
    }
}
