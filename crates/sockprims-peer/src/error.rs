use sockprims_transport::ConnectionId;

/// Errors that can occur in framed peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] sockprims_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] sockprims_frame::FrameError),

    /// No live connection has this id.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// A receive loop is already running for this client.
    #[error("receive loop already running")]
    AlreadyReceiving,

    /// The peer has been closed or stopped.
    #[error("peer closed")]
    Closed,

    /// Socket option or clone failure.
    #[error("peer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PeerError>;
