use tracing::{debug, trace};

use crate::{error::Error, telemetry::Telemetry, transport::Transport, writer::Line};

/// Default maximum packet length, in bytes.
///
/// See <https://github.com/statsd/statsd/blob/master/docs/metric_types.md#multi-metric-packets> for guidance on picking
/// a packet size for a given network MTU.
pub const DEFAULT_MAX_PACKET_LEN: usize = 512;

/// Accumulates metric lines into a single size-bounded packet.
///
/// Lines are newline-delimited, which means that multiple metrics can be sent in a single datagram and trivially split
/// apart by the remote server. The buffer never holds more than `max_packet_len` bytes: when a line would not fit, the
/// current packet is flushed to the transport first.
pub(crate) struct PacketBuffer {
    max_packet_len: usize,
    buf: Vec<u8>,
    lines: usize,
}

impl PacketBuffer {
    /// Creates a new `PacketBuffer` with the given maximum packet length.
    ///
    /// A maximum packet length of zero selects [`DEFAULT_MAX_PACKET_LEN`].
    pub fn new(max_packet_len: usize) -> Self {
        let max_packet_len = if max_packet_len == 0 { DEFAULT_MAX_PACKET_LEN } else { max_packet_len };

        Self { max_packet_len, buf: Vec::with_capacity(max_packet_len), lines: 0 }
    }

    pub fn max_packet_len(&self) -> usize {
        self.max_packet_len
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Returns the number of bytes that can still be buffered before the packet is full.
    pub fn available(&self) -> usize {
        self.max_packet_len - self.buf.len()
    }

    fn separator_len(&self) -> usize {
        usize::from(!self.buf.is_empty())
    }

    /// Appends a line to the current packet, flushing the packet to `transport` first if the line would not fit.
    ///
    /// A line that is longer than the maximum packet length by itself is rejected, leaving the buffer untouched.
    ///
    /// If the intermediate flush fails, the error is returned, but the line is still buffered as the start of the next
    /// packet: only the packet that failed to send is lost.
    pub fn append<T>(
        &mut self,
        prefix: &str,
        line: &Line,
        transport: &mut T,
        telemetry: &mut Telemetry,
    ) -> Result<(), Error>
    where
        T: Transport + ?Sized,
    {
        let line_len = prefix.len() + line.len();
        if line_len > self.max_packet_len {
            telemetry.track_line_rejected();
            return Err(Error::MetricTooLarge { len: line_len, max: self.max_packet_len });
        }

        let mut result = Ok(());
        if self.separator_len() + line_len > self.available() {
            result = self.flush(transport, telemetry);
        }

        if !self.buf.is_empty() {
            self.buf.push(b'\n');
        }
        self.buf.extend_from_slice(prefix.as_bytes());
        self.buf.extend_from_slice(line.as_bytes());
        self.lines += 1;
        telemetry.track_line_buffered();

        trace!(line_len, buffered = self.buf.len(), "Buffered metric line.");

        result
    }

    /// Appends several lines that must be sent in the same packet.
    ///
    /// If the group fits in an empty packet but not in what is left of the current one, the current packet is flushed
    /// first. A group that cannot fit in any packet is appended line by line.
    pub fn append_group<T>(
        &mut self,
        prefix: &str,
        lines: &[Line],
        transport: &mut T,
        telemetry: &mut Telemetry,
    ) -> Result<(), Error>
    where
        T: Transport + ?Sized,
    {
        let group_len = lines.iter().map(|line| prefix.len() + line.len()).sum::<usize>()
            + lines.len().saturating_sub(1);

        let mut result = Ok(());
        if group_len <= self.max_packet_len && self.separator_len() + group_len > self.available() {
            result = self.flush(transport, telemetry);
        }

        for line in lines {
            let appended = self.append(prefix, line, transport, telemetry);
            if result.is_ok() {
                result = appended;
            }
        }

        result
    }

    /// Hands the current packet to `transport`.
    ///
    /// The buffer is reset whether or not the write succeeds: a failed packet is dropped rather than retried.
    pub fn flush<T>(&mut self, transport: &mut T, telemetry: &mut Telemetry) -> Result<(), Error>
    where
        T: Transport + ?Sized,
    {
        if self.buf.is_empty() {
            return Ok(());
        }

        let expected = self.buf.len();
        let lines = self.lines;
        let result = transport.write(&self.buf);

        self.buf.clear();
        self.lines = 0;

        match result {
            Ok(written) if written == expected => {
                debug!(payload_len = expected, lines, "Flushed packet.");
                telemetry.track_packet_send_succeeded(expected);
                Ok(())
            }
            Ok(written) => {
                telemetry.track_packet_send_failed(expected);
                Err(Error::ShortWrite { written, expected })
            }
            Err(e) => {
                telemetry.track_packet_send_failed(expected);
                Err(Error::Io(e))
            }
        }
    }
}
