use crate::id::MessageId;

/// Errors that can occur in the datagram fragmentation protocol.
#[derive(Debug, thiserror::Error)]
pub enum DatagramError {
    /// The endpoint was built without the socket this operation needs.
    #[error("no {0} socket configured")]
    MissingSocket(&'static str),

    /// A received datagram does not describe a valid fragment.
    #[error("invalid fragment: {0}")]
    InvalidFragment(String),

    /// A completed message's fragments do not add up to its declared length.
    #[error("message {id} reassembled to {actual} bytes, expected {expected}")]
    LengthMismatch {
        id: MessageId,
        expected: usize,
        actual: usize,
    },

    /// The payload cannot be described by the 32-bit header fields.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] sockprims_transport::TransportError),

    /// An I/O error occurred on the socket.
    #[error("datagram I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DatagramError>;
