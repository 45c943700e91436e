//! Listening socket setup.

use std::io;
use std::net::SocketAddr;

use tokio::net::{lookup_host, TcpListener, TcpSocket};

use crate::error::{Error, Result};

/// Pending-connection backlog for each listener.
pub const BACKLOG: u32 = 1024;

/// Resolve `host:port` and listen on it with address reuse enabled.
///
/// IPv4 results are preferred when the host resolves to both families.
pub async fn bind_listener(host: &str, port: u16) -> Result<TcpListener> {
    let bind_err = |source: io::Error| Error::Bind { port, source };

    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await.map_err(bind_err)?.collect();
    let addr = addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            bind_err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", host),
            ))
        })?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;
    socket.listen(BACKLOG).map_err(bind_err)
}

/// Accept errors the listener loop logs and moves past.
///
/// Anything else ends the loop.
pub fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
