//! Blocking framed TCP peers.
//!
//! This is the "just works" layer over `sockprims-frame`: a server that
//! accepts connections and runs one receive loop per connection, and a
//! client with a single connection. Every loop is a task on a
//! caller-supplied [`TaskRunner`](sockprims_transport::TaskRunner), and each
//! delivered payload is an owned copy.

pub mod client;
pub mod config;
pub mod error;
pub mod server;

pub use client::FramedClient;
pub use config::PeerConfig;
pub use error::{PeerError, Result};
pub use server::FramedServer;
