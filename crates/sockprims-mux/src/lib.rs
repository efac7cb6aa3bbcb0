//! Non-blocking TCP connection multiplexer.
//!
//! A [`Multiplexer`] owns one readiness loop (backed by `mio`) that services
//! either a single outbound connection ([`Multiplexer::client`]) or a
//! listener and all connections it accepts ([`Multiplexer::server`]). The
//! loop runs as a single task on a caller-supplied
//! [`TaskRunner`](sockprims_transport::TaskRunner); the multiplexer never
//! spawns threads itself.
//!
//! Inbound bytes are delivered to a [`MuxHandler`] exactly as each read
//! returned them. No framing is applied; pair with `sockprims-frame` if
//! message boundaries are needed.
//!
//! ```no_run
//! use sockprims_mux::{MuxConfig, MuxContext, MuxHandler, Multiplexer};
//! use sockprims_transport::{ConnectionId, ThreadRunner};
//!
//! struct Echo;
//!
//! impl MuxHandler for Echo {
//!     fn on_receive(&self, ctx: &MuxContext, id: ConnectionId, data: &[u8]) {
//!         ctx.send(id, data);
//!     }
//! }
//!
//! let runner = ThreadRunner::new("echo");
//! let mux = Multiplexer::server(
//!     "127.0.0.1:7000".parse().unwrap(),
//!     Echo,
//!     &runner,
//!     MuxConfig::default(),
//! )?;
//! # drop(mux);
//! # Ok::<(), sockprims_mux::MuxError>(())
//! ```

pub mod config;
mod connection;
pub mod error;
pub mod handler;
pub mod multiplexer;

pub use config::{MuxConfig, DEFAULT_CHUNK_SIZE, DEFAULT_EVENTS_CAPACITY};
pub use connection::Role;
pub use error::{MuxError, Result};
pub use handler::{MuxContext, MuxHandler};
pub use multiplexer::Multiplexer;
