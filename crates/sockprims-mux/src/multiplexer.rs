use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use sockprims_transport::{ConnectionId, IdAllocator, TaskRunner};
use tracing::{debug, error, info, warn};

use crate::config::MuxConfig;
use crate::connection::{id_for, token_for, Connection, Role};
use crate::error::{MuxError, Result};
use crate::handler::{MuxContext, MuxHandler};

const LISTENER: Token = Token(0);
const CONNECTING: Token = Token(1);
const WAKER: Token = Token(2);

enum Command {
    Close(ConnectionId),
}

/// State shared between the loop thread and every [`MuxContext`].
pub(crate) struct Shared {
    registry: Registry,
    waker: Waker,
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    commands: Sender<Command>,
    ids: IdAllocator,
    stopped: AtomicBool,
    running: AtomicBool,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lookup(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.table().get(&id).cloned()
    }

    pub(crate) fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.table().keys().copied().collect();
        ids.sort();
        ids
    }

    pub(crate) fn send(&self, id: ConnectionId, data: &[u8]) -> bool {
        let Some(conn) = self.lookup(id) else {
            debug!(%id, "send to unknown connection ignored");
            return false;
        };
        match conn.write(data, &self.registry) {
            Ok(()) => true,
            Err(err) => {
                debug!(%id, error = %err, "send failed");
                false
            }
        }
    }

    pub(crate) fn close(&self, id: ConnectionId) {
        if self.commands.send(Command::Close(id)).is_err() {
            debug!(%id, "close requested after event loop exit");
            return;
        }
        self.wake();
    }

    pub(crate) fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.wake();
        }
    }

    fn wake(&self) {
        if let Err(err) = self.waker.wake() {
            debug!(error = %err, "failed to wake event loop");
        }
    }
}

/// A running TCP multiplexer.
///
/// Created in either the client or the server role; both share the same
/// dispatch loop. Dropping the multiplexer stops its loop.
pub struct Multiplexer {
    ctx: MuxContext,
    local_addr: SocketAddr,
}

impl Multiplexer {
    /// Connect to `addr` and service the connection on `runner`.
    ///
    /// The connect completes asynchronously; `on_connect` fires once it does.
    /// A failed connect is logged and leaves the multiplexer without
    /// connections.
    pub fn client<H: MuxHandler>(
        addr: SocketAddr,
        handler: H,
        runner: &dyn TaskRunner,
        config: MuxConfig,
    ) -> Result<Self> {
        validate(&config)?;
        let mut stream =
            TcpStream::connect(addr).map_err(|source| MuxError::Connect { addr, source })?;
        let local_addr = stream.local_addr()?;

        let (poll, shared, commands) = open()?;
        poll.registry()
            .register(&mut stream, CONNECTING, Interest::READABLE | Interest::WRITABLE)?;
        debug!(%addr, "connect started");

        let event_loop = EventLoop::new(poll, shared, commands, handler, &config);
        Self::start(event_loop.with_pending_connect(stream, addr), runner, local_addr)
    }

    /// Listen on `addr` and service every accepted connection on `runner`.
    pub fn server<H: MuxHandler>(
        addr: SocketAddr,
        handler: H,
        runner: &dyn TaskRunner,
        config: MuxConfig,
    ) -> Result<Self> {
        validate(&config)?;
        let mut listener =
            TcpListener::bind(addr).map_err(|source| MuxError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let (poll, shared, commands) = open()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        info!(addr = %local_addr, "multiplexer listening");

        let event_loop = EventLoop::new(poll, shared, commands, handler, &config);
        Self::start(event_loop.with_listener(listener), runner, local_addr)
    }

    fn start(event_loop: EventLoop, runner: &dyn TaskRunner, local_addr: SocketAddr) -> Result<Self> {
        let ctx = event_loop.ctx.clone();
        ctx.shared.running.store(true, Ordering::SeqCst);
        if let Err(err) = runner.execute(Box::new(move || event_loop.run())) {
            ctx.shared.running.store(false, Ordering::SeqCst);
            return Err(err.into());
        }
        Ok(Self { ctx, local_addr })
    }

    /// See [`MuxContext::send`].
    pub fn send(&self, id: ConnectionId, data: &[u8]) -> bool {
        self.ctx.send(id, data)
    }

    /// See [`MuxContext::close`].
    pub fn close(&self, id: ConnectionId) {
        self.ctx.close(id);
    }

    /// Stop the loop. Every live connection is closed and the poller is
    /// released once the loop observes the request.
    pub fn stop(&self) {
        self.ctx.stop();
    }

    /// Whether the loop task is still running.
    pub fn is_running(&self) -> bool {
        self.ctx.shared.running.load(Ordering::SeqCst)
    }

    /// Listener address (server) or local end of the outbound socket (client).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.ctx.connection_ids()
    }

    /// A cloneable handle for use from other threads.
    pub fn context(&self) -> MuxContext {
        self.ctx.clone()
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn validate(config: &MuxConfig) -> Result<()> {
    if config.chunk_size == 0 {
        return Err(MuxError::InvalidConfig("chunk_size must be non-zero".into()));
    }
    if config.events_capacity == 0 {
        return Err(MuxError::InvalidConfig("events_capacity must be non-zero".into()));
    }
    Ok(())
}

fn open() -> Result<(Poll, Arc<Shared>, Receiver<Command>)> {
    let poll = Poll::new()?;
    let registry = poll.registry().try_clone()?;
    let waker = Waker::new(poll.registry(), WAKER)?;
    let (tx, rx) = mpsc::channel();
    let shared = Arc::new(Shared {
        registry,
        waker,
        connections: Mutex::new(HashMap::new()),
        commands: tx,
        ids: IdAllocator::new(),
        stopped: AtomicBool::new(false),
        running: AtomicBool::new(false),
    });
    Ok((poll, shared, rx))
}

/// The loop task. Owns the poller; only this task inserts into or removes
/// from the connection table.
struct EventLoop {
    poll: Poll,
    ctx: MuxContext,
    handler: Box<dyn MuxHandler>,
    commands: Receiver<Command>,
    listener: Option<TcpListener>,
    connecting: Option<(TcpStream, SocketAddr)>,
    chunk: Vec<u8>,
    events_capacity: usize,
}

impl EventLoop {
    fn new<H: MuxHandler>(
        poll: Poll,
        shared: Arc<Shared>,
        commands: Receiver<Command>,
        handler: H,
        config: &MuxConfig,
    ) -> Self {
        Self {
            poll,
            ctx: MuxContext { shared },
            handler: Box::new(handler),
            commands,
            listener: None,
            connecting: None,
            chunk: vec![0u8; config.chunk_size],
            events_capacity: config.events_capacity,
        }
    }

    fn with_listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    fn with_pending_connect(mut self, stream: TcpStream, addr: SocketAddr) -> Self {
        self.connecting = Some((stream, addr));
        self
    }

    fn shared(&self) -> &Shared {
        &self.ctx.shared
    }

    fn run(mut self) {
        debug!("event loop started");
        let mut events = Events::with_capacity(self.events_capacity);

        while !self.shared().stopped.load(Ordering::SeqCst) {
            if let Err(err) = self.poll.poll(&mut events, None) {
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %err, "poll failed, event loop exiting");
                break;
            }

            for event in events.iter() {
                match event.token() {
                    WAKER => {}
                    LISTENER => self.accept_ready(),
                    CONNECTING => self.connect_ready(),
                    token => self.connection_ready(token, event),
                }
            }
            self.drain_commands();
        }

        self.shutdown();
    }

    fn accept_ready(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };
        loop {
            match listener.accept() {
                Ok((mut stream, peer)) => {
                    let id = self.ctx.shared.ids.allocate();
                    if let Err(err) =
                        self.ctx
                            .shared
                            .registry
                            .register(&mut stream, token_for(id), Interest::READABLE)
                    {
                        warn!(%id, %peer, error = %err, "failed to register accepted connection");
                        continue;
                    }
                    let conn = Arc::new(Connection::new(id, Role::Inbound, stream, peer));
                    self.ctx.shared.table().insert(id, conn);
                    debug!(%id, %peer, "connection accepted");
                    self.handler.on_accept(&self.ctx, id);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    break;
                }
            }
        }
    }

    fn connect_ready(&mut self) {
        let Some((mut stream, addr)) = self.connecting.take() else {
            return;
        };

        let failure = match stream.take_error() {
            Ok(Some(err)) | Err(err) => Some(err),
            Ok(None) => match stream.peer_addr() {
                Ok(_) => None,
                Err(err) if err.kind() == ErrorKind::NotConnected => {
                    // Spurious wakeup; still connecting.
                    self.connecting = Some((stream, addr));
                    return;
                }
                Err(err) => Some(err),
            },
        };
        if let Some(err) = failure {
            warn!(%addr, error = %err, "connect failed");
            let _ = self.shared().registry.deregister(&mut stream);
            return;
        }

        let id = self.shared().ids.allocate();
        if let Err(err) = self
            .shared()
            .registry
            .reregister(&mut stream, token_for(id), Interest::READABLE)
        {
            warn!(%id, %addr, error = %err, "failed to register connection");
            return;
        }
        let conn = Arc::new(Connection::new(id, Role::Outbound, stream, addr));
        self.shared().table().insert(id, conn);
        debug!(%id, %addr, "connected");
        self.handler.on_connect(&self.ctx, id);
    }

    fn connection_ready(&mut self, token: Token, event: &Event) {
        let Some(id) = id_for(token) else {
            return;
        };
        // Already closed earlier in this batch.
        let Some(conn) = self.shared().lookup(id) else {
            return;
        };

        if event.is_readable() || event.is_read_closed() || event.is_error() {
            if !self.read_ready(id, &conn) {
                self.close_connection(id);
                return;
            }
        }
        if event.is_writable() {
            if let Err(err) = conn.flush(&self.shared().registry) {
                debug!(%id, error = %err, "flush failed");
                self.close_connection(id);
            }
        }
    }

    /// Drain the socket. Returns `false` once the connection is finished.
    fn read_ready(&mut self, id: ConnectionId, conn: &Connection) -> bool {
        loop {
            match conn.read(&mut self.chunk) {
                Ok(0) => {
                    debug!(%id, "peer closed connection");
                    return false;
                }
                Ok(n) => {
                    self.handler.on_receive(&self.ctx, id, &self.chunk[..n]);
                    if self.shared().stopped.load(Ordering::SeqCst) {
                        return true;
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return true,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(%id, error = %err, "read failed");
                    return false;
                }
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Close(id) => {
                    if self.shared().lookup(id).is_none() {
                        debug!(%id, "close requested for unknown connection");
                        continue;
                    }
                    self.close_connection(id);
                }
            }
        }
    }

    fn close_connection(&mut self, id: ConnectionId) {
        let Some(conn) = self.shared().table().remove(&id) else {
            return;
        };
        conn.shutdown(&self.shared().registry);
        debug!(%id, "connection closed");
        self.handler.on_close(&self.ctx, id);
    }

    fn shutdown(mut self) {
        for id in self.shared().connection_ids() {
            self.close_connection(id);
        }
        if let Some(mut listener) = self.listener.take() {
            let _ = self.shared().registry.deregister(&mut listener);
        }
        if let Some((mut stream, _)) = self.connecting.take() {
            let _ = self.shared().registry.deregister(&mut stream);
        }
        self.shared().running.store(false, Ordering::SeqCst);
        info!("event loop stopped");
    }
}
