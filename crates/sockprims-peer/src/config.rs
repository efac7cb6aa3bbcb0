use sockprims_frame::FrameConfig;

/// Framed peer configuration.
#[derive(Debug, Clone, Default)]
pub struct PeerConfig {
    /// Framing limits and socket timeouts applied to every connection.
    pub frame: FrameConfig,
    /// Set `TCP_NODELAY` on every connection. Default: off.
    pub nodelay: bool,
}
