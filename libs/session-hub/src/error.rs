use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("session hub is shut down")]
    Closed,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport: {0}")]
    Transport(String),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
}
