use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Address that reaches a socket bound to `local` from this host.
///
/// Wildcard binds map to the loopback address of the same family. Used to
/// send a wake-up connection or datagram to a loop parked in a blocking
/// accept or receive.
pub fn wake_addr(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}
