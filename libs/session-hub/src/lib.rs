pub mod config;
pub mod error;
mod connection;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use stag_api::WsMessage;

pub use config::HubConfig;
pub use connection::{
    Connection, ConnectionId, ConnectionState, Frame, FrameReader, FrameWriter, Outbox,
    serve_connection,
};
pub use error::HubError;

// ═══════════════════════════════════════════════════════════════
//  Commands
// ═══════════════════════════════════════════════════════════════

enum Command {
    Register {
        session_id: String,
        conn: Connection,
    },
    Unregister {
        session_id: String,
        conn: ConnectionId,
    },
    Broadcast {
        session_id: String,
        message: WsMessage,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub sessions: usize,
    pub connections: usize,
}

// ═══════════════════════════════════════════════════════════════
//  SessionHub — handle к coordination loop'у
// ═══════════════════════════════════════════════════════════════

/// Cloneable handle. Registry `session → connections` принадлежит одной
/// задаче; все изменения проходят через её очередь команд, поэтому
/// register/unregister/broadcast применяются строго в порядке отправки.
#[derive(Clone)]
pub struct SessionHub {
    commands: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
    config: Arc<HubConfig>,
}

impl SessionHub {
    /// Запустить coordination loop. Loop завершается по `shutdown`
    /// (все соединения закрываются) или когда дропнуты все handles.
    pub fn spawn(config: HubConfig, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let registry = Registry::default();
        let handle = tokio::spawn(registry.run(rx, shutdown));

        let hub = Self {
            commands: tx,
            next_id: Arc::new(AtomicU64::new(1)),
            config: Arc::new(config),
        };
        (hub, handle)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Новое соединение с собственной исходящей очередью.
    pub fn open_connection(&self) -> (Connection, Outbox) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Connection::open(id, self.config.outbound_buffer)
    }

    /// Повторная регистрация того же соединения в той же сессии — no-op.
    pub async fn register(&self, conn: &Connection, session_id: &str) -> Result<(), HubError> {
        self.send(Command::Register {
            session_id: session_id.to_string(),
            conn: conn.clone(),
        })
        .await
    }

    /// Снять соединение с сессии и закрыть его. Для неизвестной пары — no-op,
    /// соединение остаётся открытым.
    pub async fn unregister(&self, conn: &Connection, session_id: &str) -> Result<(), HubError> {
        self.send(Command::Unregister {
            session_id: session_id.to_string(),
            conn: conn.id(),
        })
        .await
    }

    /// Разослать сообщение всем подписчикам сессии. Неизвестная сессия — no-op.
    pub async fn broadcast(&self, session_id: &str, message: WsMessage) -> Result<(), HubError> {
        self.send(Command::Broadcast {
            session_id: session_id.to_string(),
            message,
        })
        .await
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    async fn send(&self, command: Command) -> Result<(), HubError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HubError::Closed)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Registry — состояние coordination loop'а
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, HashMap<ConnectionId, Connection>>,
}

impl Registry {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        tracing::info!("session hub started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => break,
                },
            }
        }
        self.close_all();
        tracing::info!("session hub stopped");
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Register { session_id, conn } => self.register(session_id, conn),
            Command::Unregister { session_id, conn } => self.unregister(&session_id, conn),
            Command::Broadcast {
                session_id,
                message,
            } => self.broadcast(&session_id, message),
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn register(&mut self, session_id: String, conn: Connection) {
        if conn.is_closed() {
            return;
        }
        let id = conn.id();
        let members = self.sessions.entry(session_id.clone()).or_default();
        if members.contains_key(&id) {
            return;
        }
        conn.set_state(ConnectionState::Registered);
        members.insert(id, conn);
        tracing::debug!(session = %session_id, conn = id, members = members.len(), "registered");
    }

    fn unregister(&mut self, session_id: &str, conn: ConnectionId) {
        let Some(members) = self.sessions.get_mut(session_id) else {
            return;
        };
        if let Some(removed) = members.remove(&conn) {
            removed.close();
            tracing::debug!(session = %session_id, conn, "unregistered");
        }
        if members.is_empty() {
            self.sessions.remove(session_id);
        }
    }

    /// Неблокирующий fan-out: переполненная очередь = медленный подписчик,
    /// его соединение закрывается и удаляется.
    fn broadcast(&mut self, session_id: &str, message: WsMessage) {
        let Some(members) = self.sessions.get_mut(session_id) else {
            return;
        };

        members.retain(|id, conn| match conn.try_deliver(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(session = %session_id, conn = *id, "subscriber queue full, dropping");
                conn.set_state(ConnectionState::Draining);
                conn.close();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                conn.close();
                false
            }
        });

        if members.is_empty() {
            self.sessions.remove(session_id);
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            sessions: self.sessions.len(),
            connections: self.sessions.values().map(HashMap::len).sum(),
        }
    }

    fn close_all(&mut self) {
        for (_, members) in self.sessions.drain() {
            for (_, conn) in members {
                conn.close();
            }
        }
    }
}
