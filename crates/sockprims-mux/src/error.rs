use std::net::SocketAddr;

/// Errors raised while setting up a multiplexer.
///
/// Once the loop is running, per-connection failures are logged and only
/// close the affected connection; they never surface here.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Failed to bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Failed to start a non-blocking connect.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or register with the poller.
    #[error("poll setup failed: {0}")]
    Poll(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The task runner refused the event loop.
    #[error(transparent)]
    Transport(#[from] sockprims_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, MuxError>;
