use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use stag_api::{WsMessage, WsMessageType};

use crate::config::HubConfig;
use crate::error::HubError;
use crate::SessionHub;

pub type ConnectionId = u64;

// ═══════════════════════════════════════════════════════════════
//  Connection lifecycle
// ═══════════════════════════════════════════════════════════════

/// `Connecting → Registered → (Active ⇄ Draining) → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Registered = 1,
    Active = 2,
    Draining = 3,
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Registered,
            2 => ConnectionState::Active,
            3 => ConnectionState::Draining,
            _ => ConnectionState::Closed,
        }
    }
}

/// Handle подписчика: id + исходящая очередь + сигнал закрытия.
///
/// Клоны указывают на одно и то же соединение. Закрытие необратимо.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<WsMessage>,
    closed: CancellationToken,
    state: Arc<AtomicU8>,
}

/// Приёмная сторона исходящей очереди; читает только writer.
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::Receiver<WsMessage>,
}

impl Outbox {
    pub async fn recv(&mut self) -> Option<WsMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<WsMessage> {
        self.rx.try_recv().ok()
    }
}

impl Connection {
    pub(crate) fn open(id: ConnectionId, capacity: usize) -> (Self, Outbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id,
            outbound: tx,
            closed: CancellationToken::new(),
            state: Arc::new(AtomicU8::new(ConnectionState::Connecting as u8)),
        };
        (conn, Outbox { rx })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        if self.is_closed() && state != ConnectionState::Closed {
            return;
        }
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn close(&self) {
        self.state.store(ConnectionState::Closed as u8, Ordering::Release);
        self.closed.cancel();
    }

    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Неблокирующая доставка из coordination loop'а.
    pub(crate) fn try_deliver(
        &self,
        message: WsMessage,
    ) -> Result<(), mpsc::error::TrySendError<WsMessage>> {
        self.outbound.try_send(message)?;
        if self.state() == ConnectionState::Registered {
            self.set_state(ConnectionState::Active);
        }
        Ok(())
    }

    /// Поставить сообщение в собственную очередь соединения (ответ reader'а).
    pub async fn send(&self, message: WsMessage) -> Result<(), HubError> {
        tokio::select! {
            _ = self.closed.cancelled() => Err(HubError::ConnectionClosed),
            sent = self.outbound.send(message) => sent.map_err(|_| HubError::ConnectionClosed),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Transport seam
// ═══════════════════════════════════════════════════════════════

/// Кадр message-oriented канала. Сырые байты транспорта hub не видит.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(WsMessage),
    /// Transport-level heartbeat.
    Ping,
    Pong,
    Close,
}

/// Входящая половина duplex канала. `None` — соединение закрыто.
pub trait FrameReader: Send {
    fn next_frame(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Option<Result<Frame, HubError>>> + Send + '_>>;
}

/// Исходящая половина duplex канала.
pub trait FrameWriter: Send {
    fn write_frame(
        &mut self,
        frame: Frame,
    ) -> Pin<Box<dyn Future<Output = Result<(), HubError>> + Send + '_>>;
}

// ═══════════════════════════════════════════════════════════════
//  Connection driver
// ═══════════════════════════════════════════════════════════════

/// Провести одно соединение через весь lifecycle:
/// register → reader + writer → unregister.
///
/// Возвращается, когда соединение закрыто (клиент ушёл, не ответил на
/// heartbeat, запись упала, hub выкинул медленного подписчика или hub
/// остановлен).
pub async fn serve_connection<R, W>(hub: SessionHub, session_id: String, reader: R, writer: W)
where
    R: FrameReader,
    W: FrameWriter + 'static,
{
    let (conn, outbox) = hub.open_connection();
    if let Err(e) = hub.register(&conn, &session_id).await {
        tracing::warn!(session = %session_id, error = %e, "register failed");
        return;
    }
    tracing::info!(session = %session_id, conn = conn.id(), "client connected");

    let config = hub.config().clone();
    let writer_task = tokio::spawn(write_pump(conn.clone(), outbox, writer, config.clone()));

    read_pump(&conn, reader, &config).await;

    conn.close();
    if let Err(e) = hub.unregister(&conn, &session_id).await {
        tracing::debug!(session = %session_id, error = %e, "unregister after hub shutdown");
    }
    if let Err(e) = writer_task.await {
        tracing::warn!(session = %session_id, error = %e, "writer task failed");
    }
    tracing::info!(session = %session_id, conn = conn.id(), "client disconnected");
}

/// Reader: ждёт кадры клиента, отвечает pong на ping, следит за heartbeat.
async fn read_pump<R: FrameReader>(conn: &Connection, mut reader: R, config: &HubConfig) {
    let mut deadline = Instant::now() + config.pong_wait();

    loop {
        let frame = tokio::select! {
            _ = conn.closed() => break,
            _ = tokio::time::sleep_until(deadline) => {
                tracing::debug!(conn = conn.id(), "heartbeat not acknowledged, closing");
                break;
            }
            frame = reader.next_frame() => frame,
        };

        match frame {
            None | Some(Ok(Frame::Close)) => break,
            Some(Err(e)) => {
                tracing::debug!(conn = conn.id(), error = %e, "read error");
                break;
            }
            Some(Ok(Frame::Pong)) => {
                deadline = Instant::now() + config.pong_wait();
            }
            // Transport отвечает на ping сам.
            Some(Ok(Frame::Ping)) => {}
            Some(Ok(Frame::Message(msg))) => match msg.r#type {
                WsMessageType::Ping => {
                    if conn.send(WsMessage::pong()).await.is_err() {
                        break;
                    }
                }
                other => {
                    tracing::debug!(conn = conn.id(), kind = %other, "ignoring client message");
                }
            },
        }
    }
}

/// Writer: очередь или heartbeat — что раньше. Ошибка/таймаут записи закрывает соединение.
async fn write_pump<W: FrameWriter>(
    conn: Connection,
    mut outbox: Outbox,
    mut writer: W,
    config: HubConfig,
) {
    let write_wait = config.write_wait();
    let mut heartbeat =
        tokio::time::interval_at(Instant::now() + config.ping_interval(), config.ping_interval());

    loop {
        let frame = tokio::select! {
            biased;
            _ = conn.closed() => {
                let _ = tokio::time::timeout(write_wait, writer.write_frame(Frame::Close)).await;
                break;
            }
            msg = outbox.recv() => match msg {
                Some(msg) => Frame::Message(msg),
                None => break,
            },
            _ = heartbeat.tick() => Frame::Ping,
        };

        match tokio::time::timeout(write_wait, writer.write_frame(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(conn = conn.id(), error = %e, "failed to write message");
                break;
            }
            Err(_) => {
                tracing::warn!(conn = conn.id(), error = %HubError::WriteTimeout(write_wait), "failed to write message");
                break;
            }
        }
    }

    conn.close();
}
