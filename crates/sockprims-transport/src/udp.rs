use std::net::{SocketAddr, UdpSocket};

use tracing::info;

use crate::error::{Result, TransportError};

/// Bind a UDP socket on `addr`. Port 0 picks an ephemeral port.
pub fn bind_udp(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
    if let Ok(local_addr) = socket.local_addr() {
        info!(%local_addr, "bound udp socket");
    }
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_exchange() {
        let a = bind_udp("127.0.0.1:0".parse().unwrap()).unwrap();
        let b = bind_udp("127.0.0.1:0".parse().unwrap()).unwrap();
        a.send_to(b"ping", b.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = b.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, a.local_addr().unwrap());
    }
}
