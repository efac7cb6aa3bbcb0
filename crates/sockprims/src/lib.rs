//! TCP and UDP message primitives.
//!
//! sockprims turns unstructured byte streams into discrete application
//! messages. Pick one strategy per transport need; they are never composed
//! automatically.
//!
//! # Crate Structure
//!
//! - [`transport`]: sockets, connection ids, task runners, stop signals
//! - [`mux`]: non-blocking TCP connection multiplexer (client and server roles)
//! - [`frame`]: length-prefixed framing over reliable streams
//! - [`datagram`]: fixed-layout fragmentation and reassembly over UDP
//! - [`peer`]: blocking framed TCP client/server (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use sockprims_transport::*;
}

/// Re-export multiplexer types.
pub mod mux {
    pub use sockprims_mux::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sockprims_frame::*;
}

/// Re-export datagram types.
pub mod datagram {
    pub use sockprims_datagram::*;
}

/// Re-export framed peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use sockprims_peer::*;
}
