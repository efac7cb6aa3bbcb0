use std::net::SocketAddr;
use std::sync::Arc;

use sockprims_transport::ConnectionId;

use crate::connection::Role;
use crate::multiplexer::Shared;

/// Application callbacks driven by the event loop.
///
/// All methods run on the loop thread and must not block: a slow handler
/// stalls every connection of its multiplexer. Use the [`MuxContext`] to
/// reply, close connections or stop the loop.
pub trait MuxHandler: Send + Sync + 'static {
    /// An outbound connection finished connecting.
    fn on_connect(&self, _ctx: &MuxContext, _id: ConnectionId) {}

    /// A new inbound connection was accepted.
    fn on_accept(&self, _ctx: &MuxContext, _id: ConnectionId) {}

    /// Bytes arrived on `id`, exactly as one read returned them.
    fn on_receive(&self, ctx: &MuxContext, id: ConnectionId, data: &[u8]);

    /// `id` was closed, by the peer, by `close`, or by `stop`.
    fn on_close(&self, _ctx: &MuxContext, _id: ConnectionId) {}
}

/// Handle onto a running multiplexer, usable from any thread.
#[derive(Clone)]
pub struct MuxContext {
    pub(crate) shared: Arc<Shared>,
}

impl MuxContext {
    /// Queue `data` for `id`. Returns `false` if the connection is unknown
    /// or already failed; nothing is sent in that case.
    pub fn send(&self, id: ConnectionId, data: &[u8]) -> bool {
        self.shared.send(id, data)
    }

    /// Ask the loop to close `id`. Unknown ids are ignored.
    pub fn close(&self, id: ConnectionId) {
        self.shared.close(id);
    }

    /// Ask the loop to close every connection and exit.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Ids of all live connections.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.shared.connection_ids()
    }

    pub fn peer_addr(&self, id: ConnectionId) -> Option<SocketAddr> {
        self.shared.lookup(id).map(|conn| conn.peer_addr())
    }

    pub fn role(&self, id: ConnectionId) -> Option<Role> {
        self.shared.lookup(id).map(|conn| conn.role())
    }

    /// Bytes accepted by `send` but not yet written to the socket.
    pub fn queued_bytes(&self, id: ConnectionId) -> Option<usize> {
        self.shared.lookup(id).map(|conn| conn.queued_len())
    }
}
