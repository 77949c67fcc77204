use std::{net::SocketAddr, time::Duration};

use thiserror::Error;
use tracing::debug;

use crate::{
    buffer::DEFAULT_MAX_PACKET_LEN,
    client::StatsdClient,
    sampling::{Sampler, ThreadRngSampler},
    transport::{RemoteAddr, RemoteTransport, Transport},
};

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that could occur while building a StatsD client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// Failed to create or configure the socket.
    #[error("failed to set up socket: {0}")]
    Socket(#[source] std::io::Error),

    /// Failed to install the recorder due to an existing global recorder already being installed.
    #[cfg(feature = "recorder")]
    #[error("failed to install client as global recorder")]
    FailedToInstall,
}

/// Builder for a StatsD client.
pub struct StatsdBuilder {
    remote_addr: RemoteAddr,
    write_timeout: Option<Duration>,
    max_packet_len: usize,
    prefix: Option<String>,
    sampler: Box<dyn Sampler>,
}

impl StatsdBuilder {
    /// Set the remote address to send metrics to.
    ///
    /// For UDP, the address simply needs to be in the format of `<host>:<port>`, and is resolved immediately. On Linux, a
    /// Unix domain socket in `SOCK_DGRAM` mode can be used instead with an address in the format of `unixgram://<path>`.
    ///
    /// When the host resolves to both IPv4 and IPv6 addresses, the first IPv4 address is used.
    ///
    /// Defaults to sending to `127.0.0.1:8125` over UDP.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid address, an error will be returned indicating the
    /// reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.remote_addr = RemoteAddr::try_from(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        Ok(self)
    }

    /// Set the write timeout for sending packets.
    ///
    /// When the write timeout is reached, the packet being sent at the time is dropped without retrying, and the
    /// operation that triggered the send returns an error. Passing `None` makes writes block until they complete.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the maximum packet length.
    ///
    /// Metrics are packed into packets of up to this many bytes. A metric that would not fit in an empty packet is
    /// rejected. This should be set with the MTU of the network path to the server in mind: 512 bytes is safe for the
    /// open internet, while values such as 1432 are commonly used on fast ethernet, and 8932 on gigabit with jumbo frames.
    ///
    /// A value of zero selects the default.
    ///
    /// Defaults to 512 bytes.
    #[must_use]
    pub fn with_max_packet_length(mut self, max_packet_len: usize) -> Self {
        self.max_packet_len = max_packet_len;
        self
    }

    /// Set the initial key prefix.
    ///
    /// The prefix is normalized to end in exactly one `.`, and can later be changed with
    /// [`StatsClient::set_prefix`](crate::StatsClient::set_prefix).
    ///
    /// Defaults to no prefix.
    #[must_use]
    pub fn with_prefix<P>(mut self, prefix: P) -> Self
    where
        P: Into<String>,
    {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the sampler used to decide whether metrics with a sample rate below 1.0 are sent.
    ///
    /// Defaults to [`ThreadRngSampler`].
    #[must_use]
    pub fn with_sampler<S>(mut self, sampler: S) -> Self
    where
        S: Sampler + 'static,
    {
        self.sampler = Box::new(sampler);
        self
    }

    /// Builds the client, binding a socket for the configured remote address.
    ///
    /// # Errors
    ///
    /// If the socket cannot be created or configured, an error will be returned.
    pub fn build(self) -> Result<StatsdClient<RemoteTransport>, BuildError> {
        let transport = RemoteTransport::connect(&self.remote_addr, self.write_timeout)
            .map_err(BuildError::Socket)?;

        debug!(
            transport = self.remote_addr.transport_id(),
            remote_addr = ?self.remote_addr,
            max_packet_len = self.max_packet_len,
            "Built StatsD client."
        );

        Ok(self.build_with_transport(transport))
    }

    /// Builds the client on top of the given transport.
    ///
    /// The configured remote address and write timeout are ignored.
    pub fn build_with_transport<T>(self, transport: T) -> StatsdClient<T>
    where
        T: Transport,
    {
        StatsdClient::from_parts(transport, self.max_packet_len, self.prefix.as_deref(), self.sampler)
    }

    /// Builds the client and installs a recorder for it as the global [`metrics`] recorder.
    ///
    /// Nothing is flushed in the background, so the returned client should be flushed periodically, and closed on
    /// shutdown.
    ///
    /// # Errors
    ///
    /// If the socket cannot be created or configured, or if a global recorder is already installed, an error will be
    /// returned.
    #[cfg(feature = "recorder")]
    pub fn install(self) -> Result<std::sync::Arc<StatsdClient<RemoteTransport>>, BuildError> {
        let client = std::sync::Arc::new(self.build()?);
        let recorder = crate::recorder::StatsdRecorder::new(std::sync::Arc::clone(&client));

        metrics::set_global_recorder(recorder).map_err(|_| BuildError::FailedToInstall)?;
        Ok(client)
    }
}

impl Default for StatsdBuilder {
    fn default() -> Self {
        StatsdBuilder {
            remote_addr: RemoteAddr::Udp(vec![SocketAddr::from(([127, 0, 0, 1], 8125))]),
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
            prefix: None,
            sampler: Box::new(ThreadRngSampler),
        }
    }
}
