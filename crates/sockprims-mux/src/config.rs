/// Maximum bytes read from a connection per `on_receive` call.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Readiness events fetched per poll.
pub const DEFAULT_EVENTS_CAPACITY: usize = 128;

/// Multiplexer configuration.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Read chunk size. Each `on_receive` call carries at most this many bytes.
    pub chunk_size: usize,
    /// Capacity of the poll event buffer.
    pub events_capacity: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
        }
    }
}
