//! Fixed-layout message fragmentation and reassembly over UDP.
//!
//! Messages are split into fragments of at most [`DATA_LENGTH`] bytes, each
//! carried in one [`PACKET_LENGTH`]-byte datagram:
//!
//! ```text
//! ┌────────────┬───────┬───────┬────────┬─────────┬──────────────┐
//! │ Message ID │ Count │ Index │ Valid  │ Content │ Data         │
//! │ (32B ASCII)│ (4B)  │ (4B)  │ (4B)   │ (4B)    │ (32768B)     │
//! └────────────┴───────┴───────┴────────┴─────────┴──────────────┘
//! ```
//!
//! All integers are big-endian. Fragments may arrive in any order; the
//! [`Reassembler`] emits a message once every index is present. Lost
//! fragments are never retransmitted, so by default an incomplete message
//! waits forever. [`ReassemblyConfig`] can bound that.

pub mod endpoint;
pub mod error;
pub mod fragment;
pub mod id;
pub mod packet;
pub mod pool;
pub mod reassembly;

pub use endpoint::{DatagramConfig, DatagramEndpoint, ReceiveStopper};
pub use error::{DatagramError, Result};
pub use fragment::{fragment_count, fragment_message};
pub use id::{MessageId, MessageIdGenerator, ID_LENGTH};
pub use packet::{encode_packet, parse_packet, FragmentHeader, DATA_LENGTH, HEADER_LENGTH, PACKET_LENGTH};
pub use pool::{FragmentBuf, FragmentPool};
pub use reassembly::{Reassembler, ReassemblyConfig};
