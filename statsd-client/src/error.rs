use std::io;

use thiserror::Error;

/// Errors that could occur while recording, flushing, or closing.
#[derive(Debug, Error)]
pub enum Error {
    /// The client was already closed.
    #[error("client already closed")]
    Closed,

    /// The transport failed to send a packet.
    ///
    /// The packet is dropped: it is not retried, and the packet buffer is reset regardless.
    #[error("failed to send packet: {0}")]
    Io(#[from] io::Error),

    /// The transport only accepted part of a packet.
    #[error("short write: sent {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes the transport reported as written.
        written: usize,

        /// Length of the packet.
        expected: usize,
    },

    /// A single metric line is longer than the maximum packet length and can never be sent.
    #[error("metric of {len} bytes exceeds maximum packet length of {max} bytes")]
    MetricTooLarge {
        /// Length of the metric line, including the key prefix.
        len: usize,

        /// Maximum packet length of the client.
        max: usize,
    },
}

impl Error {
    /// Returns `true` if this error was caused by using a client after it was closed.
    pub const fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }
}
