use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
    time::Duration,
};

#[cfg(target_os = "linux")]
use std::{os::unix::net::UnixDatagram, path::Path};

use tracing::debug;

use super::Transport;

/// Returns `true` if the error only means that this one datagram went nowhere.
///
/// Datagram sockets can surface an ICMP "port unreachable" from a previous send as an error on a later one, and a Unix
/// datagram socket reports a missing listener the same way. Neither affects whether the next datagram can be sent.
fn is_datagram_loss(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound)
}

/// UDP transport.
///
/// The socket is bound to an ephemeral local port and is left unconnected: every payload is sent to the remote address
/// with `send_to`, so that a remote server going away never poisons the socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    remote_addr: SocketAddr,
}

impl UdpTransport {
    /// Binds a new `UdpTransport` that sends to `remote_addr`.
    ///
    /// # Errors
    ///
    /// If the local socket cannot be bound or configured, an error is returned.
    pub fn bind(remote_addr: SocketAddr, write_timeout: Option<Duration>) -> io::Result<Self> {
        let local_addr = if remote_addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        let socket = UdpSocket::bind(local_addr)?;
        socket.set_write_timeout(write_timeout)?;

        Ok(Self { socket, remote_addr })
    }

    /// Returns the local address the socket is bound to.
    ///
    /// # Errors
    ///
    /// If the local address cannot be queried, an error is returned.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Returns the remote address payloads are sent to.
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl Transport for UdpTransport {
    fn write(&mut self, payload: &[u8]) -> io::Result<usize> {
        match self.socket.send_to(payload, self.remote_addr) {
            Err(e) if is_datagram_loss(&e) => {
                debug!(error = %e, remote_addr = %self.remote_addr, "Datagram lost in transit.");
                Ok(payload.len())
            }
            result => result,
        }
    }

    fn close(&mut self) -> io::Result<()> {
        // Nothing to tear down: the socket is released when the transport is dropped.
        Ok(())
    }
}

/// Unix domain socket transport in `SOCK_DGRAM` mode.
#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct UnixDatagramTransport {
    socket: UnixDatagram,
}

#[cfg(target_os = "linux")]
impl UnixDatagramTransport {
    /// Creates a new `UnixDatagramTransport` sending to the socket at `path`.
    ///
    /// # Errors
    ///
    /// If the socket cannot be created, configured, or connected, an error is returned.
    pub fn connect<P>(path: P, write_timeout: Option<Duration>) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let socket = UnixDatagram::unbound()?;
        socket.set_write_timeout(write_timeout)?;
        socket.connect(path)?;

        Ok(Self { socket })
    }
}

#[cfg(target_os = "linux")]
impl Transport for UnixDatagramTransport {
    fn write(&mut self, payload: &[u8]) -> io::Result<usize> {
        match self.socket.send(payload) {
            Err(e) if is_datagram_loss(&e) => {
                debug!(error = %e, "Datagram lost in transit.");
                Ok(payload.len())
            }
            result => result,
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.socket.shutdown(std::net::Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            result => result,
        }
    }
}
