//! In-memory capture of flushed packets.
//!
//! [`CaptureTransport`] stands in for a network transport: every packet a client flushes is recorded, and can be read
//! back one metric line at a time through the paired [`Capture`] handle. This makes it possible to test code that emits
//! metrics without touching the network:
//!
//! ```
//! use statsd_client::{StatsClient as _, StatsdClient};
//!
//! let (client, capture) = StatsdClient::capture();
//! client.increment("requests", 1, 1.0).unwrap();
//! client.flush().unwrap();
//!
//! assert_eq!(capture.next_line().as_deref(), Some("requests:1|c"));
//! assert_eq!(capture.next_line(), None);
//! ```
use std::{collections::VecDeque, io, sync::Arc};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{client::StatsdClient, transport::Transport};

#[derive(Default)]
struct Shared {
    datagrams: Vec<Bytes>,
    next_datagram: usize,
    pending_lines: VecDeque<String>,
}

impl Shared {
    fn next_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.pending_lines.pop_front() {
                return Some(line);
            }

            // Split the next unread datagram into lines, or signal that we've read everything.
            let datagram = self.datagrams.get(self.next_datagram)?;
            self.next_datagram += 1;

            self.pending_lines.extend(
                datagram
                    .split(|b| *b == b'\n')
                    .map(|line| String::from_utf8_lossy(line).trim().to_owned()),
            );
        }
    }
}

/// Transport that records every packet written to it in memory.
///
/// Created together with its reader by [`Capture::new`].
pub struct CaptureTransport {
    shared: Arc<Mutex<Shared>>,
}

impl Transport for CaptureTransport {
    fn write(&mut self, payload: &[u8]) -> io::Result<usize> {
        self.shared.lock().datagrams.push(Bytes::copy_from_slice(payload));
        Ok(payload.len())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reader for the packets recorded by a [`CaptureTransport`].
#[derive(Clone)]
pub struct Capture {
    shared: Arc<Mutex<Shared>>,
}

impl Capture {
    /// Creates a new transport and the reader attached to it.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (CaptureTransport, Capture) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (CaptureTransport { shared: Arc::clone(&shared) }, Capture { shared })
    }

    /// Consumes and returns the next recorded metric line, trimmed of surrounding whitespace.
    ///
    /// Lines are delimited by newlines within a packet, as well as by packet boundaries. Returns `None` once every
    /// recorded line has been read, which is distinct from `Some(String::new())` for an empty line.
    pub fn next_line(&self) -> Option<String> {
        self.shared.lock().next_line()
    }

    /// Returns every packet recorded so far, whether or not its lines have been read.
    pub fn datagrams(&self) -> Vec<Bytes> {
        self.shared.lock().datagrams.clone()
    }
}

/// A client whose packets are captured in memory.
pub type CaptureClient = StatsdClient<CaptureTransport>;
