/// Client telemetry.
///
/// `Telemetry` is a point-in-time snapshot of how many lines a client has buffered and how many packets and bytes it
/// has handed to its transport, or lost trying to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Telemetry {
    lines_buffered: u64,
    lines_rejected: u64,
    packets_sent: u64,
    packets_dropped: u64,
    bytes_sent: u64,
    bytes_dropped: u64,
}

impl Telemetry {
    /// Number of metric lines written into the packet buffer.
    pub const fn lines_buffered(&self) -> u64 {
        self.lines_buffered
    }

    /// Number of metric lines rejected for being larger than the maximum packet length.
    pub const fn lines_rejected(&self) -> u64 {
        self.lines_rejected
    }

    /// Number of packets fully written to the transport.
    pub const fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Number of packets that failed to send or were only partially written.
    pub const fn packets_dropped(&self) -> u64 {
        self.packets_dropped
    }

    /// Number of bytes in packets fully written to the transport.
    pub const fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Number of bytes in packets that failed to send or were only partially written.
    pub const fn bytes_dropped(&self) -> u64 {
        self.bytes_dropped
    }

    pub(crate) fn track_line_buffered(&mut self) {
        self.lines_buffered += 1;
    }

    pub(crate) fn track_line_rejected(&mut self) {
        self.lines_rejected += 1;
    }

    pub(crate) fn track_packet_send_succeeded(&mut self, bytes_len: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes_len as u64;
    }

    pub(crate) fn track_packet_send_failed(&mut self, bytes_len: usize) {
        self.packets_dropped += 1;
        self.bytes_dropped += bytes_len as u64;
    }
}
