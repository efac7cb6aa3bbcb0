//! TCP/UDP transport plumbing shared by every sockprims strategy.
//!
//! This is the lowest layer of sockprims. It provides:
//! - Blocking TCP bind/accept/connect and UDP bind helpers
//! - Monotonic [`ConnectionId`] allocation
//! - The [`TaskRunner`] seam through which loops are handed to caller-owned threads
//! - [`StopSignal`] for cooperative cancellation of receive loops

pub mod addr;
pub mod error;
pub mod ids;
pub mod runner;
pub mod signal;
pub mod tcp;
pub mod udp;

pub use addr::wake_addr;
pub use error::{Result, TransportError};
pub use ids::{ConnectionId, IdAllocator};
pub use runner::{Task, TaskRunner, ThreadRunner};
pub use signal::StopSignal;
pub use tcp::{shutdown_stream, TcpTransport};
pub use udp::bind_udp;
