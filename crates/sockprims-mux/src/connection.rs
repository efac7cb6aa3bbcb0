use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::{Buf, BytesMut};
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use sockprims_transport::ConnectionId;
use tracing::debug;

/// Tokens below this value are reserved for the listener, the pending
/// connect and the waker.
pub(crate) const FIRST_CONNECTION_TOKEN: usize = 3;

pub(crate) fn token_for(id: ConnectionId) -> Token {
    Token(id.get() as usize + FIRST_CONNECTION_TOKEN)
}

pub(crate) fn id_for(token: Token) -> Option<ConnectionId> {
    token
        .0
        .checked_sub(FIRST_CONNECTION_TOKEN)
        .map(|raw| ConnectionId::new(raw as u64))
}

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened by [`Multiplexer::client`](crate::Multiplexer::client).
    Outbound,
    /// Accepted by [`Multiplexer::server`](crate::Multiplexer::server).
    Inbound,
}

/// A live connection in the multiplexer table.
///
/// The stream, its outbound queue and the registered interest share one
/// lock, so `send` from any thread and flushing on the loop thread never
/// interleave partial writes.
pub(crate) struct Connection {
    id: ConnectionId,
    role: Role,
    peer_addr: SocketAddr,
    state: Mutex<State>,
}

struct State {
    stream: TcpStream,
    queued: BytesMut,
    interest: Interest,
    closed: bool,
}

impl Connection {
    /// Wrap a stream that is already registered for `Interest::READABLE`.
    pub(crate) fn new(id: ConnectionId, role: Role, stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            role,
            peer_addr,
            state: Mutex::new(State {
                stream,
                queued: BytesMut::new(),
                interest: Interest::READABLE,
                closed: false,
            }),
        }
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub(crate) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.lock().stream.read(buf)
    }

    /// Queue `data` and write as much as the socket accepts right now.
    pub(crate) fn write(&self, data: &[u8], registry: &Registry) -> io::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(ErrorKind::NotConnected.into());
        }
        state.queued.extend_from_slice(data);
        state.flush(registry, token_for(self.id))
    }

    /// Continue writing queued bytes after a writable event.
    pub(crate) fn flush(&self, registry: &Registry) -> io::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Ok(());
        }
        state.flush(registry, token_for(self.id))
    }

    pub(crate) fn queued_len(&self) -> usize {
        self.lock().queued.len()
    }

    /// Deregister and shut down both halves. Queued bytes are discarded.
    pub(crate) fn shutdown(&self, registry: &Registry) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        if !state.queued.is_empty() {
            debug!(id = %self.id, dropped = state.queued.len(), "discarding unsent bytes");
            state.queued.clear();
        }
        if let Err(err) = registry.deregister(&mut state.stream) {
            debug!(id = %self.id, error = %err, "deregister failed");
        }
        if let Err(err) = state.stream.shutdown(Shutdown::Both) {
            if err.kind() != ErrorKind::NotConnected {
                debug!(id = %self.id, error = %err, "shutdown failed");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn flush(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        while !self.queued.is_empty() {
            match self.stream.write(&self.queued) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => self.queued.advance(n),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        let wanted = if self.queued.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        if wanted != self.interest {
            registry.reregister(&mut self.stream, token, wanted)?;
            self.interest = wanted;
        }
        Ok(())
    }
}
