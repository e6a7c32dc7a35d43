use std::time::Duration;

use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════
//  Hub Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Ёмкость исходящей очереди каждого подписчика.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Ёмкость очереди команд coordination loop'а.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    /// Период heartbeat ping'ов от writer'а.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Сколько reader ждёт pong до закрытия соединения.
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,
    /// Таймаут одной записи в транспорт.
    #[serde(default = "default_write_wait_secs")]
    pub write_wait_secs: u64,
}

fn default_outbound_buffer() -> usize {
    256
}
fn default_command_buffer() -> usize {
    1024
}
fn default_ping_interval_secs() -> u64 {
    54
}
fn default_pong_wait_secs() -> u64 {
    60
}
fn default_write_wait_secs() -> u64 {
    10
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            command_buffer: default_command_buffer(),
            ping_interval_secs: default_ping_interval_secs(),
            pong_wait_secs: default_pong_wait_secs(),
            write_wait_secs: default_write_wait_secs(),
        }
    }
}

impl HubConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs.max(1))
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs.max(1))
    }
}
