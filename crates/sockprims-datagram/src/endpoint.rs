use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use sockprims_transport::{wake_addr, StopSignal};
use tracing::{debug, warn};

use crate::error::{DatagramError, Result};
use crate::fragment::fragment_message;
use crate::id::{MessageId, MessageIdGenerator};
use crate::packet::PACKET_LENGTH;
use crate::reassembly::{Reassembler, ReassemblyConfig};

/// Endpoint configuration.
#[derive(Debug, Clone, Default)]
pub struct DatagramConfig {
    /// Read timeout on the receive socket. Default: none (block forever).
    ///
    /// With a timeout the receive loop wakes up periodically to check its
    /// stop signal. Without one, stop the loop through a
    /// [`ReceiveStopper`].
    pub read_timeout: Option<Duration>,
    /// Incomplete-message limits.
    pub reassembly: ReassemblyConfig,
}

/// Sends and receives fragmented messages over UDP.
///
/// An endpoint may hold a receive socket, a send socket with its target, or
/// both. Calling an operation whose socket is missing fails with
/// [`DatagramError::MissingSocket`].
pub struct DatagramEndpoint {
    receive_socket: Option<UdpSocket>,
    send_socket: Option<(UdpSocket, SocketAddr)>,
    ids: Arc<MessageIdGenerator>,
    reassembler: Reassembler,
    recv_buf: Vec<u8>,
}

impl DatagramEndpoint {
    pub fn new(
        receive_socket: Option<UdpSocket>,
        send_socket: Option<(UdpSocket, SocketAddr)>,
        config: DatagramConfig,
    ) -> Result<Self> {
        if let Some(socket) = &receive_socket {
            socket.set_read_timeout(config.read_timeout)?;
        }
        Ok(Self {
            receive_socket,
            send_socket,
            ids: Arc::new(MessageIdGenerator::new()),
            reassembler: Reassembler::with_config(config.reassembly),
            // One spare byte so oversized datagrams are detectable.
            recv_buf: vec![0u8; PACKET_LENGTH + 1],
        })
    }

    /// Receive-only endpoint.
    pub fn receiver(socket: UdpSocket, config: DatagramConfig) -> Result<Self> {
        Self::new(Some(socket), None, config)
    }

    /// Send-only endpoint transmitting to `target`.
    pub fn sender(socket: UdpSocket, target: SocketAddr) -> Result<Self> {
        Self::new(None, Some((socket, target)), DatagramConfig::default())
    }

    /// Endpoint that both receives and sends.
    pub fn duplex(
        receive_socket: UdpSocket,
        send_socket: UdpSocket,
        target: SocketAddr,
        config: DatagramConfig,
    ) -> Result<Self> {
        Self::new(Some(receive_socket), Some((send_socket, target)), config)
    }

    /// Use a shared id generator, e.g. one per process.
    pub fn with_id_generator(mut self, ids: Arc<MessageIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Fragment and transmit `payload`. Fragments go out back to back with
    /// no pacing; lost fragments are not retransmitted.
    pub fn send(&self, payload: &[u8]) -> Result<MessageId> {
        let (socket, target) = self
            .send_socket
            .as_ref()
            .ok_or(DatagramError::MissingSocket("send"))?;

        let id = self.ids.next_id();
        let packets = fragment_message(id, payload)?;
        for packet in &packets {
            socket.send_to(packet, target)?;
        }
        debug!(%id, %target, len = payload.len(), fragments = packets.len(), "message sent");
        Ok(id)
    }

    /// Handle that stops a [`receive`](Self::receive) loop running with
    /// `stop`, even one blocked waiting for a datagram.
    pub fn stopper(&self, stop: &StopSignal) -> Result<ReceiveStopper> {
        Ok(ReceiveStopper {
            stop: stop.clone(),
            target: wake_addr(self.local_addr()?),
        })
    }

    /// Receive datagrams until `stop` is signalled, invoking `callback` for
    /// every reassembled message.
    ///
    /// Invalid datagrams are logged and skipped. The stop signal is checked
    /// after each datagram or read timeout.
    pub fn receive<F>(&mut self, stop: &StopSignal, mut callback: F) -> Result<()>
    where
        F: FnMut(&MessageId, Vec<u8>),
    {
        let socket = self
            .receive_socket
            .as_ref()
            .ok_or(DatagramError::MissingSocket("receive"))?;

        while !stop.is_stopped() {
            let (n, from) = match socket.recv_from(&mut self.recv_buf) {
                Ok(received) => received,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
                    ) =>
                {
                    debug!(error = %err, "ignoring icmp error on receive socket");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            if stop.is_stopped() {
                break;
            }

            match self.reassembler.push_packet(&self.recv_buf[..n]) {
                Ok(Some((id, payload))) => callback(&id, payload),
                Ok(None) => {}
                Err(err) => warn!(%from, error = %err, "dropping datagram"),
            }
        }

        debug!("datagram receive loop stopped");
        Ok(())
    }

    /// Address of the receive socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self
            .receive_socket
            .as_ref()
            .ok_or(DatagramError::MissingSocket("receive"))?;
        Ok(socket.local_addr()?)
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }
}

/// Stops a receive loop from another thread.
///
/// Setting the signal alone is not enough when the loop is parked in
/// `recv_from` with no read timeout, so [`stop`](Self::stop) also sends an
/// empty datagram to the receive socket.
#[derive(Debug, Clone)]
pub struct ReceiveStopper {
    stop: StopSignal,
    target: SocketAddr,
}

impl ReceiveStopper {
    pub fn stop(&self) {
        self.stop.stop();

        let bind: SocketAddr = if self.target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let sent = UdpSocket::bind(bind).and_then(|socket| socket.send_to(&[], self.target));
        if let Err(err) = sent {
            warn!(target = %self.target, error = %err, "failed to wake receive loop");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use sockprims_transport::bind_udp;

    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn polling() -> DatagramConfig {
        DatagramConfig {
            read_timeout: Some(Duration::from_millis(20)),
            ..DatagramConfig::default()
        }
    }

    #[test]
    fn send_without_socket_fails_fast() {
        let rx = DatagramEndpoint::receiver(bind_udp(loopback()).unwrap(), polling()).unwrap();
        assert!(matches!(
            rx.send(b"x"),
            Err(DatagramError::MissingSocket("send"))
        ));
    }

    #[test]
    fn receive_without_socket_fails_fast() {
        let tx_socket = bind_udp(loopback()).unwrap();
        let target = tx_socket.local_addr().unwrap();
        let mut tx = DatagramEndpoint::sender(tx_socket, target).unwrap();
        let result = tx.receive(&StopSignal::new(), |_, _| {});
        assert!(matches!(result, Err(DatagramError::MissingSocket("receive"))));
    }

    #[test]
    fn stopped_loop_returns_immediately() {
        let mut rx = DatagramEndpoint::receiver(bind_udp(loopback()).unwrap(), polling()).unwrap();
        let stop = StopSignal::new();
        stop.stop();
        rx.receive(&stop, |_, _| panic!("no message expected")).unwrap();
    }

    #[test]
    fn stopper_releases_receive_blocked_without_timeout() {
        let mut rx =
            DatagramEndpoint::receiver(bind_udp(loopback()).unwrap(), DatagramConfig::default())
                .unwrap();
        let stop = StopSignal::new();
        let stopper = rx.stopper(&stop).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let mut delivered = 0;
            let result = rx.receive(&stop, |_, _| delivered += 1);
            let _ = done_tx.send((result.is_ok(), delivered));
        });

        thread::sleep(Duration::from_millis(50));
        stopper.stop();

        let (ok, delivered) = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("receive loop should stop");
        assert!(ok);
        assert_eq!(delivered, 0);
        handle.join().unwrap();
    }

    #[test]
    fn stopper_needs_receive_socket() {
        let tx_socket = bind_udp(loopback()).unwrap();
        let target = tx_socket.local_addr().unwrap();
        let tx = DatagramEndpoint::sender(tx_socket, target).unwrap();
        assert!(matches!(
            tx.stopper(&StopSignal::new()),
            Err(DatagramError::MissingSocket("receive"))
        ));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn large_message_over_udp() {
        let mut rx = DatagramEndpoint::receiver(bind_udp(loopback()).unwrap(), polling()).unwrap();
        let target = rx.local_addr().unwrap();
        let tx = DatagramEndpoint::sender(bind_udp(loopback()).unwrap(), target).unwrap();

        let payload: Vec<u8> = (0..70_000u32).map(|i| (i % 253) as u8).collect();
        let sent_id = tx.send(&payload).unwrap();

        let stop = StopSignal::new();
        let mut received = Vec::new();
        rx.receive(&stop, |id, data| {
            received.push((*id, data));
            stop.stop();
        })
        .unwrap();

        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, sent_id);
        assert_eq!(received[0].1, payload);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn reordered_datagrams_and_junk_are_tolerated() {
        let mut rx = DatagramEndpoint::receiver(bind_udp(loopback()).unwrap(), polling()).unwrap();
        let target = rx.local_addr().unwrap();
        let raw = bind_udp(loopback()).unwrap();

        let payload = vec![0xEE; 40_000];
        let id = MessageId::from_value(123);
        let packets = fragment_message(id, &payload).unwrap();
        raw.send_to(b"not a fragment", target).unwrap();
        raw.send_to(&packets[1], target).unwrap();
        raw.send_to(&packets[0], target).unwrap();

        let stop = StopSignal::new();
        let mut received = Vec::new();
        rx.receive(&stop, |id, data| {
            received.push((*id, data));
            stop.stop();
        })
        .unwrap();

        assert_eq!(received, vec![(id, payload)]);
    }
}
