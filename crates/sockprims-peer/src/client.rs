use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use sockprims_frame::{FrameReader, FrameWriter};
use sockprims_transport::{shutdown_stream, StopSignal, TaskRunner, TcpTransport};
use tracing::{debug, warn};

use crate::config::PeerConfig;
use crate::error::{PeerError, Result};

/// Blocking framed TCP client with a single connection.
pub struct FramedClient {
    stream: TcpStream,
    writer: Mutex<FrameWriter<TcpStream>>,
    peer_addr: SocketAddr,
    stop: StopSignal,
    receiving: AtomicBool,
    config: PeerConfig,
}

impl FramedClient {
    /// Connect to a framed server (blocking).
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_config(addr, PeerConfig::default())
    }

    pub fn connect_with_config(addr: SocketAddr, config: PeerConfig) -> Result<Self> {
        let stream = TcpTransport::connect(addr)?;
        stream.set_nodelay(config.nodelay)?;
        let writer = FrameWriter::with_config_tcp(stream.try_clone()?, config.frame.clone())?;
        Ok(Self {
            stream,
            writer: Mutex::new(writer),
            peer_addr: addr,
            stop: StopSignal::new(),
            receiving: AtomicBool::new(false),
            config,
        })
    }

    /// Send one framed payload.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        if self.stop.is_stopped() {
            return Err(PeerError::Closed);
        }
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.send(payload)?;
        Ok(())
    }

    /// Run the receive loop on `runner`, handing each payload to `receiver`
    /// as an owned copy. Only one loop may run per client.
    pub fn receive<F>(&self, runner: &dyn TaskRunner, mut receiver: F) -> Result<()>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        if self.stop.is_stopped() {
            return Err(PeerError::Closed);
        }
        if self.receiving.swap(true, Ordering::SeqCst) {
            return Err(PeerError::AlreadyReceiving);
        }

        let mut reader = match self.open_reader() {
            Ok(reader) => reader,
            Err(err) => {
                self.receiving.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };

        let stop = self.stop.clone();
        let peer = self.peer_addr;
        let submitted = runner.execute(Box::new(move || {
            let result = reader.receive(&stop, |payload, len| receiver(payload[..len].to_vec()));
            match result {
                Ok(()) => debug!(%peer, "receive loop finished"),
                Err(err) if stop.is_stopped() => debug!(%peer, error = %err, "receive loop closed"),
                Err(err) => warn!(%peer, error = %err, "receive loop failed"),
            }
        }));
        if let Err(err) = submitted {
            self.receiving.store(false, Ordering::SeqCst);
            return Err(err.into());
        }
        Ok(())
    }

    fn open_reader(&self) -> Result<FrameReader<TcpStream>> {
        let stream = self.stream.try_clone()?;
        Ok(FrameReader::with_config_tcp(stream, self.config.frame.clone())?)
    }

    /// Shut down both halves. A running receive loop ends; later sends fail.
    pub fn close(&self) {
        if self.stop.is_stopped() {
            return;
        }
        self.stop.stop();
        shutdown_stream(&self.stream);
        debug!(peer = %self.peer_addr, "client closed");
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.local_addr()?)
    }
}

impl Drop for FramedClient {
    fn drop(&mut self) {
        self.close();
    }
}
