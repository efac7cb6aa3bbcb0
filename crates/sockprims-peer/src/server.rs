use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sockprims_frame::{FrameReader, FrameWriter};
use sockprims_transport::{
    shutdown_stream, wake_addr, ConnectionId, IdAllocator, StopSignal, TaskRunner, TcpTransport,
};
use tracing::{debug, info, warn};

use crate::config::PeerConfig;
use crate::error::{PeerError, Result};

/// Per-connection payload callback. Receives an owned copy of each payload.
pub type Receiver = Box<dyn FnMut(Vec<u8>) + Send + 'static>;

/// Blocking framed TCP server.
///
/// Each accepted connection gets a [`ConnectionId`] and its own receive loop
/// on the runner. Frames arriving while no receiver is set for their
/// connection are dropped; set one from the `on_accept` callback to see
/// every frame.
pub struct FramedServer {
    inner: Arc<Inner>,
}

struct Inner {
    transport: TcpTransport,
    runner: Arc<dyn TaskRunner>,
    sessions: Mutex<HashMap<ConnectionId, Arc<Session>>>,
    ids: IdAllocator,
    stop: StopSignal,
    accepting: AtomicBool,
    config: PeerConfig,
}

struct Session {
    peer_addr: SocketAddr,
    stream: TcpStream,
    writer: Mutex<FrameWriter<TcpStream>>,
    receiver: Mutex<Option<Receiver>>,
    stop: StopSignal,
}

impl FramedServer {
    /// Bind to `addr`. Nothing is accepted until [`accept`](Self::accept).
    pub fn bind(addr: SocketAddr, runner: Arc<dyn TaskRunner>) -> Result<Self> {
        Self::bind_with_config(addr, runner, PeerConfig::default())
    }

    pub fn bind_with_config(
        addr: SocketAddr,
        runner: Arc<dyn TaskRunner>,
        config: PeerConfig,
    ) -> Result<Self> {
        let transport = TcpTransport::bind(addr)?;
        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                runner,
                sessions: Mutex::new(HashMap::new()),
                ids: IdAllocator::new(),
                stop: StopSignal::new(),
                accepting: AtomicBool::new(false),
                config,
            }),
        })
    }

    /// Start the accept loop on the runner. `on_accept` runs on the accept
    /// thread for every new connection, before its receive loop starts.
    ///
    /// Calling this again while the loop runs is a no-op.
    pub fn accept<F>(&self, on_accept: F) -> Result<()>
    where
        F: Fn(ConnectionId) + Send + 'static,
    {
        if self.inner.stop.is_stopped() {
            return Err(PeerError::Closed);
        }
        if self.inner.accepting.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let submitted = self
            .inner
            .runner
            .execute(Box::new(move || accept_loop(inner, on_accept)));
        if let Err(err) = submitted {
            self.inner.accepting.store(false, Ordering::SeqCst);
            return Err(err.into());
        }
        Ok(())
    }

    /// Install the payload callback for `id`, replacing any previous one.
    pub fn set_receiver<F>(&self, id: ConnectionId, receiver: F) -> Result<()>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        let session = self.inner.session(id)?;
        *session.lock_receiver() = Some(Box::new(receiver));
        Ok(())
    }

    /// Send one framed payload to `id`.
    pub fn send(&self, id: ConnectionId, payload: &[u8]) -> Result<()> {
        let session = self.inner.session(id)?;
        let mut writer = session.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.send(payload)?;
        Ok(())
    }

    /// Close `id`, unblocking its receive loop. Returns `false` for an
    /// unknown id.
    pub fn close(&self, id: ConnectionId) -> bool {
        self.inner.remove(id)
    }

    /// Close every connection and stop accepting.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Ids of all live connections, ascending.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.inner.table().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn peer_addr(&self, id: ConnectionId) -> Result<SocketAddr> {
        Ok(self.inner.session(id)?.peer_addr)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.transport.local_addr()
    }
}

impl Drop for FramedServer {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl Inner {
    fn table(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self, id: ConnectionId) -> Result<Arc<Session>> {
        self.table()
            .get(&id)
            .cloned()
            .ok_or(PeerError::UnknownConnection(id))
    }

    /// Add an accepted stream to the session table. Fails with
    /// [`PeerError::Closed`] and shuts the stream down once the server has
    /// stopped.
    fn register(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(ConnectionId, Arc<Session>, FrameReader<TcpStream>)> {
        stream.set_nodelay(self.config.nodelay)?;
        let frame = self.config.frame.clone();
        let reader = FrameReader::with_config_tcp(stream.try_clone()?, frame.clone())?;
        let writer = FrameWriter::with_config_tcp(stream.try_clone()?, frame)?;

        // Checked under the table lock: `stop` sets the flag before draining.
        let mut table = self.table();
        if self.stop.is_stopped() {
            drop(table);
            shutdown_stream(&stream);
            return Err(PeerError::Closed);
        }

        let id = self.ids.allocate();
        let session = Arc::new(Session {
            peer_addr,
            stream,
            writer: Mutex::new(writer),
            receiver: Mutex::new(None),
            stop: StopSignal::new(),
        });
        table.insert(id, Arc::clone(&session));
        Ok((id, session, reader))
    }

    fn remove(&self, id: ConnectionId) -> bool {
        let Some(session) = self.table().remove(&id) else {
            return false;
        };
        session.stop.stop();
        shutdown_stream(&session.stream);
        debug!(%id, "connection closed");
        true
    }

    fn stop(&self) {
        if self.stop.is_stopped() {
            return;
        }
        self.stop.stop();

        let sessions: Vec<_> = self.table().drain().collect();
        for (id, session) in sessions {
            session.stop.stop();
            shutdown_stream(&session.stream);
            debug!(%id, "connection closed on stop");
        }

        // A blocking accept only returns once a connection arrives.
        if self.accepting.load(Ordering::SeqCst) {
            let _ = TcpStream::connect(wake_addr(self.transport.local_addr()));
        }
        info!(addr = %self.transport.local_addr(), "framed server stopped");
    }
}

impl Session {
    fn lock_receiver(&self) -> MutexGuard<'_, Option<Receiver>> {
        self.receiver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand `payload` to the current receiver without holding the lock
    /// during the call, so the receiver may replace itself.
    fn deliver(&self, id: ConnectionId, payload: Vec<u8>) {
        let taken = self.lock_receiver().take();
        let Some(mut receiver) = taken else {
            debug!(%id, len = payload.len(), "no receiver set, frame dropped");
            return;
        };
        receiver(payload);
        let mut slot = self.lock_receiver();
        if slot.is_none() {
            *slot = Some(receiver);
        }
    }
}

fn accept_loop<F>(inner: Arc<Inner>, on_accept: F)
where
    F: Fn(ConnectionId),
{
    debug!(addr = %inner.transport.local_addr(), "accept loop started");
    while !inner.stop.is_stopped() {
        let (stream, peer) = match inner.transport.accept() {
            Ok(accepted) => accepted,
            Err(err) => {
                if !inner.stop.is_stopped() {
                    warn!(error = %err, "accept failed, accept loop exiting");
                }
                break;
            }
        };
        if inner.stop.is_stopped() {
            shutdown_stream(&stream);
            break;
        }

        let (id, session, reader) = match inner.register(stream, peer) {
            Ok(registered) => registered,
            Err(PeerError::Closed) => break,
            Err(err) => {
                warn!(%peer, error = %err, "failed to set up connection");
                continue;
            }
        };
        debug!(%id, %peer, "connection accepted");
        on_accept(id);

        let task_inner = Arc::clone(&inner);
        if let Err(err) = inner
            .runner
            .execute(Box::new(move || receive_loop(task_inner, id, session, reader)))
        {
            warn!(%id, error = %err, "no runner for receive loop, closing connection");
            inner.remove(id);
        }
    }
    inner.accepting.store(false, Ordering::SeqCst);
    debug!("accept loop stopped");
}

fn receive_loop(
    inner: Arc<Inner>,
    id: ConnectionId,
    session: Arc<Session>,
    mut reader: FrameReader<TcpStream>,
) {
    let result = reader.receive(&session.stop, |payload, len| {
        session.deliver(id, payload[..len].to_vec());
    });
    match result {
        Ok(()) => debug!(%id, "receive loop finished"),
        Err(err) if session.stop.is_stopped() => debug!(%id, error = %err, "receive loop closed"),
        Err(err) => warn!(%id, error = %err, "receive loop failed"),
    }
    inner.remove(id);
}
