//! Transports that flushed packets are sent over.
//!
//! Clients are generic over [`Transport`], which is implemented for UDP sockets, Unix datagram sockets (on Linux), and
//! the in-memory [`CaptureTransport`](crate::CaptureTransport).
use std::{
    io,
    net::{SocketAddr, ToSocketAddrs as _},
    time::Duration,
};

#[cfg(target_os = "linux")]
use std::path::PathBuf;

mod socket;
pub use self::socket::UdpTransport;
#[cfg(target_os = "linux")]
pub use self::socket::UnixDatagramTransport;

/// A packet-oriented transport that flushed payloads are handed to.
///
/// Transports are expected to be unreliable and connectionless: a payload is sent as a single datagram, and the loss of
/// a datagram should not be reported as an error when the underlying socket allows for telling the two apart.
///
/// Clients guarantee that `close` is called at most once, and that `write` is never called after `close`.
pub trait Transport: Send {
    /// Writes `payload` as a single datagram, returning the number of bytes written.
    ///
    /// A partial write is reported by returning fewer bytes than `payload.len()`.
    ///
    /// # Errors
    ///
    /// If the payload could not be sent, an error is returned.
    fn write(&mut self, payload: &[u8]) -> io::Result<usize>;

    /// Closes the transport.
    ///
    /// # Errors
    ///
    /// If the underlying resource fails to close cleanly, an error is returned.
    fn close(&mut self) -> io::Result<()>;
}

impl<T> Transport for Box<T>
where
    T: Transport + ?Sized,
{
    fn write(&mut self, payload: &[u8]) -> io::Result<usize> {
        (**self).write(payload)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

#[derive(Clone, Debug)]
pub(crate) enum RemoteAddr {
    Udp(Vec<SocketAddr>),

    #[cfg(target_os = "linux")]
    Unixgram(PathBuf),
}

impl RemoteAddr {
    /// Returns the address datagrams are sent to: the first IPv4 address, or the first address of any family if there
    /// is none. `localhost` often resolves to `::1` first, while StatsD servers commonly listen on IPv4 only.
    fn preferred_udp_addr(addrs: &[SocketAddr]) -> Option<SocketAddr> {
        addrs.iter().find(|addr| addr.is_ipv4()).or_else(|| addrs.first()).copied()
    }

    /// Returns the transport ID for the remote address.
    pub const fn transport_id(&self) -> &'static str {
        match self {
            RemoteAddr::Udp(_) => "udp",
            #[cfg(target_os = "linux")]
            RemoteAddr::Unixgram(_) => "uds",
        }
    }
}

impl<'a> TryFrom<&'a str> for RemoteAddr {
    type Error = String;

    fn try_from(addr: &'a str) -> Result<Self, Self::Error> {
        if let Some((scheme, path)) = addr.split_once("://") {
            return match scheme {
                #[cfg(target_os = "linux")]
                "unixgram" => Ok(RemoteAddr::Unixgram(PathBuf::from(path))),
                _ => Err(format!("invalid scheme '{}' (expected 'unixgram')", scheme)),
            };
        }

        match addr.to_socket_addrs() {
            Ok(addrs) => {
                let addrs = addrs.collect::<Vec<_>>();
                if addrs.is_empty() {
                    Err(format!("'{}' did not resolve to any address", addr))
                } else {
                    Ok(RemoteAddr::Udp(addrs))
                }
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Transport for a remote StatsD server, as configured by [`StatsdBuilder`](crate::StatsdBuilder).
#[derive(Debug)]
pub enum RemoteTransport {
    /// UDP socket.
    Udp(UdpTransport),

    /// Unix domain socket in `SOCK_DGRAM` mode.
    #[cfg(target_os = "linux")]
    Unixgram(UnixDatagramTransport),
}

impl RemoteTransport {
    pub(crate) fn connect(remote_addr: &RemoteAddr, write_timeout: Option<Duration>) -> io::Result<Self> {
        match remote_addr {
            RemoteAddr::Udp(addrs) => {
                let addr = RemoteAddr::preferred_udp_addr(addrs).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "remote address resolved to nothing")
                })?;
                UdpTransport::bind(addr, write_timeout).map(RemoteTransport::Udp)
            }

            #[cfg(target_os = "linux")]
            RemoteAddr::Unixgram(path) => {
                UnixDatagramTransport::connect(path, write_timeout).map(RemoteTransport::Unixgram)
            }
        }
    }
}

impl Transport for RemoteTransport {
    fn write(&mut self, payload: &[u8]) -> io::Result<usize> {
        match self {
            RemoteTransport::Udp(transport) => transport.write(payload),
            #[cfg(target_os = "linux")]
            RemoteTransport::Unixgram(transport) => transport.write(payload),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self {
            RemoteTransport::Udp(transport) => transport.close(),
            #[cfg(target_os = "linux")]
            RemoteTransport::Unixgram(transport) => transport.close(),
        }
    }
}
