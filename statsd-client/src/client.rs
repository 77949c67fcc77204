use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    buffer::PacketBuffer,
    builder::{BuildError, StatsdBuilder},
    capture::{Capture, CaptureTransport},
    error::Error,
    prefix::normalize_prefix,
    sampling::Sampler,
    telemetry::Telemetry,
    transport::{RemoteTransport, Transport},
    writer::{Metric, Sign},
};

/// Operations for sending metrics to a StatsD server.
///
/// Every metric operation takes a sample rate. A rate of 1.0 or more always sends the metric. A rate below 1.0 sends the
/// metric with that probability, appending the rate to the metric so that the server can scale it back up. A metric
/// that is sampled out is not an error.
///
/// The trait is object safe, with the exception of [`StatsClient::time`].
pub trait StatsClient: Send + Sync {
    /// Sets the key prefix for all metrics sent after this call.
    ///
    /// Trailing `.` characters are stripped and exactly one is appended, so `"app"`, `"app."` and `"app..."` are
    /// equivalent.
    fn set_prefix(&self, prefix: &str);

    /// Increments a counter by `count`.
    ///
    /// # Errors
    ///
    /// If the client is closed, or a packet had to be flushed to make room and failed to send, an error is returned.
    fn increment(&self, stat: &str, count: i64, rate: f64) -> Result<(), Error>;

    /// Decrements a counter by `count`.
    ///
    /// This is sent as an increment by `-count`, which is exact for every `count`, including `i64::MIN`.
    ///
    /// # Errors
    ///
    /// If the client is closed, or a packet had to be flushed to make room and failed to send, an error is returned.
    fn decrement(&self, stat: &str, count: i64, rate: f64) -> Result<(), Error>;

    /// Records a timing from a [`Duration`], sent as fractional milliseconds.
    ///
    /// # Errors
    ///
    /// If the client is closed, or a packet had to be flushed to make room and failed to send, an error is returned.
    fn duration(&self, stat: &str, elapsed: Duration, rate: f64) -> Result<(), Error>;

    /// Records a timing in whole milliseconds.
    ///
    /// # Errors
    ///
    /// If the client is closed, or a packet had to be flushed to make room and failed to send, an error is returned.
    fn timing(&self, stat: &str, millis: u64, rate: f64) -> Result<(), Error>;

    /// Runs `f` and records how long it took as a timing.
    ///
    /// # Errors
    ///
    /// If the client is closed, or a packet had to be flushed to make room and failed to send, an error is returned.
    fn time<F>(&self, stat: &str, rate: f64, f: F) -> Result<(), Error>
    where
        Self: Sized,
        F: FnOnce(),
    {
        let start = Instant::now();
        f();
        self.duration(stat, start.elapsed(), rate)
    }

    /// Sets a gauge to `value`.
    ///
    /// # Errors
    ///
    /// If the client is closed, or a packet had to be flushed to make room and failed to send, an error is returned.
    fn gauge(&self, stat: &str, value: i64, rate: f64) -> Result<(), Error>;

    /// Increments a gauge by `value`.
    ///
    /// # Errors
    ///
    /// If the client is closed, or a packet had to be flushed to make room and failed to send, an error is returned.
    fn increment_gauge(&self, stat: &str, value: u64, rate: f64) -> Result<(), Error>;

    /// Decrements a gauge by `value`.
    ///
    /// # Errors
    ///
    /// If the client is closed, or a packet had to be flushed to make room and failed to send, an error is returned.
    fn decrement_gauge(&self, stat: &str, value: u64, rate: f64) -> Result<(), Error>;

    /// Records an occurrence of `value` in a set of unique values.
    ///
    /// # Errors
    ///
    /// If the client is closed, or a packet had to be flushed to make room and failed to send, an error is returned.
    fn unique(&self, stat: &str, value: i64, rate: f64) -> Result<(), Error>;

    /// Sends any buffered metrics.
    ///
    /// # Errors
    ///
    /// If the client is closed, or the packet fails to send, an error is returned.
    fn flush(&self) -> Result<(), Error>;

    /// Sends any buffered metrics and closes the client.
    ///
    /// Only the first call can succeed: every later call returns [`Error::Closed`].
    ///
    /// # Errors
    ///
    /// If the client is already closed, or the final packet or the transport fails to close, an error is returned.
    fn close(&self) -> Result<(), Error>;
}

struct State<T> {
    prefix: String,
    buffer: PacketBuffer,
    transport: Option<T>,
    telemetry: Telemetry,
}

/// A buffered StatsD client.
///
/// Metrics are encoded into lines as they are recorded, and packed into a buffer that is sent as a single packet once
/// the next line would not fit, or when the client is flushed or closed. Nothing is sent in the background: callers that
/// record metrics infrequently should flush periodically.
///
/// The client can be shared between threads. Encoding happens on the calling thread, and a single lock serializes access
/// to the prefix and the packet buffer.
pub struct StatsdClient<T: Transport = RemoteTransport> {
    state: Mutex<State<T>>,
    closed: AtomicBool,
    sampler: Box<dyn Sampler>,
}

impl StatsdClient<RemoteTransport> {
    /// Creates a client sending to `addr` with the default configuration.
    ///
    /// # Errors
    ///
    /// If the address is invalid or the socket cannot be set up, an error is returned.
    pub fn dial<A>(addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        StatsdBuilder::default().with_remote_address(addr)?.build()
    }

    /// Creates a client sending to `addr` with the given maximum packet length.
    ///
    /// # Errors
    ///
    /// If the address is invalid or the socket cannot be set up, an error is returned.
    pub fn dial_with_size<A>(addr: A, max_packet_len: usize) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        StatsdBuilder::default()
            .with_remote_address(addr)?
            .with_max_packet_length(max_packet_len)
            .build()
    }
}

impl StatsdClient<CaptureTransport> {
    /// Creates a client that captures its packets in memory, along with the reader for them.
    pub fn capture() -> (Self, Capture) {
        let (transport, capture) = Capture::new();
        (StatsdBuilder::default().build_with_transport(transport), capture)
    }
}

impl<T: Transport> StatsdClient<T> {
    pub(crate) fn from_parts(
        transport: T,
        max_packet_len: usize,
        prefix: Option<&str>,
        sampler: Box<dyn Sampler>,
    ) -> Self {
        let state = State {
            prefix: prefix.map(normalize_prefix).unwrap_or_default(),
            buffer: PacketBuffer::new(max_packet_len),
            transport: Some(transport),
            telemetry: Telemetry::default(),
        };

        Self { state: Mutex::new(state), closed: AtomicBool::new(false), sampler }
    }

    /// Returns the current key prefix.
    pub fn prefix(&self) -> String {
        self.state.lock().prefix.clone()
    }

    /// Returns the maximum packet length.
    pub fn max_packet_len(&self) -> usize {
        self.state.lock().buffer.max_packet_len()
    }

    /// Returns a snapshot of the client's telemetry.
    pub fn telemetry(&self) -> Telemetry {
        self.state.lock().telemetry
    }

    /// Returns `true` if the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn send(&self, metric: Metric<'_>, rate: f64) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let Some(line) = metric.encode(rate, &*self.sampler) else {
            trace!(rate, "Metric sampled out.");
            return Ok(());
        };

        let mut state = self.state.lock();
        let State { prefix, buffer, transport, telemetry } = &mut *state;
        let transport = transport.as_mut().ok_or(Error::Closed)?;

        buffer.append(prefix, &line, transport, telemetry)
    }

    /// Sends unsampled metrics that the server must see together, in order, in the same packet.
    #[cfg(feature = "recorder")]
    pub(crate) fn send_group(&self, metrics: &[Metric<'_>]) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let lines = metrics
            .iter()
            .filter_map(|metric| metric.encode(1.0, &*self.sampler))
            .collect::<Vec<_>>();

        let mut state = self.state.lock();
        let State { prefix, buffer, transport, telemetry } = &mut *state;
        let transport = transport.as_mut().ok_or(Error::Closed)?;

        buffer.append_group(prefix, &lines, transport, telemetry)
    }
}

impl<T: Transport> StatsClient for StatsdClient<T> {
    fn set_prefix(&self, prefix: &str) {
        let prefix = normalize_prefix(prefix);
        self.state.lock().prefix = prefix;
    }

    fn increment(&self, stat: &str, count: i64, rate: f64) -> Result<(), Error> {
        self.send(Metric::counter(stat, count), rate)
    }

    fn decrement(&self, stat: &str, count: i64, rate: f64) -> Result<(), Error> {
        self.send(Metric::negated_counter(stat, count), rate)
    }

    fn duration(&self, stat: &str, elapsed: Duration, rate: f64) -> Result<(), Error> {
        self.send(Metric::duration(stat, elapsed), rate)
    }

    fn timing(&self, stat: &str, millis: u64, rate: f64) -> Result<(), Error> {
        self.send(Metric::timing(stat, millis), rate)
    }

    fn gauge(&self, stat: &str, value: i64, rate: f64) -> Result<(), Error> {
        self.send(Metric::gauge(stat, value), rate)
    }

    fn increment_gauge(&self, stat: &str, value: u64, rate: f64) -> Result<(), Error> {
        self.send(Metric::gauge_delta(stat, Sign::Plus, value), rate)
    }

    fn decrement_gauge(&self, stat: &str, value: u64, rate: f64) -> Result<(), Error> {
        self.send(Metric::gauge_delta(stat, Sign::Minus, value), rate)
    }

    fn unique(&self, stat: &str, value: i64, rate: f64) -> Result<(), Error> {
        self.send(Metric::set(stat, value), rate)
    }

    fn flush(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        let State { buffer, transport, telemetry, .. } = &mut *state;
        let transport = transport.as_mut().ok_or(Error::Closed)?;

        buffer.flush(transport, telemetry)
    }

    fn close(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        let State { buffer, transport, telemetry, .. } = &mut *state;

        // Taking the transport is what makes the transition one-way, even if the final flush fails.
        let mut transport = transport.take().ok_or(Error::Closed)?;
        self.closed.store(true, Ordering::Release);

        let flush_result = buffer.flush(&mut transport, telemetry);
        let close_result = transport.close().map_err(Error::Io);
        debug!(?telemetry, "Closed client.");

        flush_result.and(close_result)
    }
}

impl<T: Transport> Drop for StatsdClient<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(transport) = state.transport.as_mut() {
            if let Err(e) = state.buffer.flush(transport, &mut state.telemetry) {
                debug!(error = %e, "Failed to flush buffered metrics on drop.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use super::{StatsClient, StatsdClient};
    use crate::{
        builder::StatsdBuilder,
        capture::{Capture, CaptureTransport},
        error::Error,
        sampling::FixedSampler,
        transport::Transport,
    };

    #[derive(Clone, Default)]
    struct CountingTransport {
        writes: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        fail_writes: bool,
    }

    impl Transport for CountingTransport {
        fn write(&mut self, payload: &[u8]) -> io::Result<usize> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                Err(io::Error::new(io::ErrorKind::Other, "network down"))
            } else {
                Ok(payload.len())
            }
        }

        fn close(&mut self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Captures packets, unless told to fail.
    struct FlakyTransport {
        inner: CaptureTransport,
        failing: Arc<AtomicBool>,
    }

    impl Transport for FlakyTransport {
        fn write(&mut self, payload: &[u8]) -> io::Result<usize> {
            if self.failing.load(Ordering::SeqCst) {
                Err(io::Error::new(io::ErrorKind::Other, "network down"))
            } else {
                self.inner.write(payload)
            }
        }

        fn close(&mut self) -> io::Result<()> {
            self.inner.close()
        }
    }

    fn single_line<F>(f: F) -> Option<String>
    where
        F: FnOnce(&StatsdClient<CaptureTransport>) -> Result<(), Error>,
    {
        let (client, capture) = StatsdClient::capture();
        f(&client).unwrap();
        client.flush().unwrap();

        let line = capture.next_line();
        assert_eq!(capture.next_line(), None, "expected at most one line");
        line
    }

    #[test]
    fn operations() {
        assert_eq!(single_line(|c| c.increment("incr", 1, 1.0)).as_deref(), Some("incr:1|c"));
        assert_eq!(single_line(|c| c.decrement("decr", 1, 1.0)).as_deref(), Some("decr:-1|c"));
        assert_eq!(
            single_line(|c| c.decrement("decr", i64::MIN, 1.0)).as_deref(),
            Some("decr:9223372036854775808|c")
        );
        assert_eq!(
            single_line(|c| c.duration("timing", Duration::from_nanos(123_456_789), 1.0)).as_deref(),
            Some("timing:123.456789|ms")
        );
        assert_eq!(single_line(|c| c.timing("timing", 350, 1.0)).as_deref(), Some("timing:350|ms"));
        assert_eq!(single_line(|c| c.gauge("gauge", 300, 1.0)).as_deref(), Some("gauge:300|g"));
        assert_eq!(
            single_line(|c| c.increment_gauge("gauge", 10, 1.0)).as_deref(),
            Some("gauge:+10|g")
        );
        assert_eq!(
            single_line(|c| c.decrement_gauge("gauge", 4, 1.0)).as_deref(),
            Some("gauge:-4|g")
        );
        assert_eq!(single_line(|c| c.unique("unique", 765, 1.0)).as_deref(), Some("unique:765|s"));
    }

    #[test]
    fn time_records_elapsed() {
        let line = single_line(|c| c.time("time", 1.0, || thread::sleep(Duration::from_millis(50))))
            .expect("time should emit a line");

        let millis = line
            .strip_prefix("time:")
            .and_then(|rest| rest.strip_suffix("|ms"))
            .and_then(|value| value.parse::<f64>().ok())
            .expect("line should be a millisecond timing");
        assert!(millis >= 50.0, "recorded {millis}ms");
    }

    #[test]
    fn rate_zero_never_sends() {
        assert_eq!(single_line(|c| c.increment("incr", 1, 0.0)), None);
    }

    #[test]
    fn sampled_rate_is_appended() {
        let (transport, capture) = Capture::new();
        let client =
            StatsdBuilder::default().with_sampler(FixedSampler(0.0)).build_with_transport(transport);

        client.increment("incr", 1, 0.99901).unwrap();
        client.increment("incr", 1, 0.99).unwrap();
        client.flush().unwrap();

        assert_eq!(capture.next_line().as_deref(), Some("incr:1|c|@0.99901"));
        assert_eq!(capture.next_line().as_deref(), Some("incr:1|c|@0.99"));
        assert_eq!(capture.next_line(), None);
    }

    #[test]
    fn sampled_out_is_not_an_error() {
        let (transport, capture) = Capture::new();
        let client =
            StatsdBuilder::default().with_sampler(FixedSampler(0.75)).build_with_transport(transport);

        assert!(client.increment("incr", 1, 0.5).is_ok());
        assert!(client.flush().is_ok());
        assert_eq!(capture.next_line(), None);
        assert!(capture.datagrams().is_empty());
        assert_eq!(client.telemetry().lines_buffered(), 0);
    }

    #[test]
    fn multi_metric_packet() {
        let (client, capture) = StatsdClient::capture();
        client.unique("unique", 765, 1.0).unwrap();
        client.unique("unique", 765, 1.0).unwrap();
        client.flush().unwrap();

        assert_eq!(capture.datagrams().len(), 1);
        assert_eq!(capture.datagrams()[0].as_ref(), b"unique:765|s\nunique:765|s");
        assert_eq!(capture.next_line().as_deref(), Some("unique:765|s"));
        assert_eq!(capture.next_line().as_deref(), Some("unique:765|s"));
        assert_eq!(capture.next_line(), None);
    }

    #[test]
    fn multi_metric_packet_overflow() {
        // With the default 512-byte packets, 39 lines of 12 bytes fit along with their separators.
        let (client, capture) = StatsdClient::capture();
        for _ in 0..40 {
            client.unique("unique", 765, 1.0).unwrap();
        }

        for _ in 0..39 {
            assert_eq!(capture.next_line().as_deref(), Some("unique:765|s"));
        }
        assert_eq!(capture.next_line(), None);

        client.flush().unwrap();
        assert_eq!(capture.next_line().as_deref(), Some("unique:765|s"));
        assert_eq!(capture.next_line(), None);

        let datagrams = capture.datagrams();
        assert_eq!(datagrams.len(), 2);
        assert_eq!(datagrams[0].len(), 39 * 12 + 38);
    }

    #[test]
    fn prefix_normalization() {
        for prefix in ["a.b.c", "a.b.c.", "a.b.c..."] {
            let line = single_line(|c| {
                c.set_prefix(prefix);
                c.increment("key", 1, 1.0)
            });
            assert_eq!(line.as_deref(), Some("a.b.c.key:1|c"));
        }
    }

    #[test]
    fn prefix_defaults_to_empty() {
        let (client, _capture) = StatsdClient::capture();
        assert_eq!(client.prefix(), "");

        client.set_prefix("");
        assert_eq!(client.prefix(), ".");
    }

    #[test]
    fn prefix_applies_to_later_metrics_only() {
        let (client, capture) = StatsdClient::capture();
        client.increment("before", 1, 1.0).unwrap();
        client.set_prefix("app");
        client.increment("after", 1, 1.0).unwrap();
        client.flush().unwrap();

        assert_eq!(capture.next_line().as_deref(), Some("before:1|c"));
        assert_eq!(capture.next_line().as_deref(), Some("app.after:1|c"));
    }

    #[test]
    fn close_is_one_shot() {
        let transport = CountingTransport::default();
        let client = StatsdBuilder::default().build_with_transport(transport.clone());

        client.increment("incr", 1, 1.0).unwrap();
        assert!(client.close().is_ok());
        assert!(client.is_closed());
        assert_eq!(transport.writes.load(Ordering::SeqCst), 1);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);

        for _ in 0..3 {
            assert!(matches!(client.close(), Err(Error::Closed)));
        }
        assert!(client.increment("incr", 1, 1.0).unwrap_err().is_closed());
        assert!(client.increment("incr", 1, 0.0).unwrap_err().is_closed());
        assert!(client.flush().unwrap_err().is_closed());

        assert_eq!(transport.writes.load(Ordering::SeqCst), 1);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_still_closes_after_failed_flush() {
        let transport = CountingTransport { fail_writes: true, ..CountingTransport::default() };
        let client = StatsdBuilder::default().build_with_transport(transport.clone());

        client.increment("incr", 1, 1.0).unwrap();
        assert!(matches!(client.close(), Err(Error::Io(_))));
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(client.close(), Err(Error::Closed)));
    }

    #[test]
    fn failed_flush_drops_packet() {
        let transport = CountingTransport { fail_writes: true, ..CountingTransport::default() };
        let client = StatsdBuilder::default().build_with_transport(transport.clone());

        client.increment("incr", 1, 1.0).unwrap();
        assert!(matches!(client.flush(), Err(Error::Io(_))));

        // The failed packet is not retried.
        assert!(client.flush().is_ok());
        assert_eq!(transport.writes.load(Ordering::SeqCst), 1);

        let telemetry = client.telemetry();
        assert_eq!(telemetry.packets_dropped(), 1);
        assert_eq!(telemetry.bytes_dropped(), 8);
        assert_eq!(telemetry.packets_sent(), 0);
    }

    #[test]
    fn flush_after_failure_sends_only_new_lines() {
        let (inner, capture) = Capture::new();
        let failing = Arc::new(AtomicBool::new(true));
        let transport = FlakyTransport { inner, failing: Arc::clone(&failing) };
        let client = StatsdBuilder::default().build_with_transport(transport);

        client.increment("lost", 1, 1.0).unwrap();
        client.increment("lost", 2, 1.0).unwrap();
        assert!(matches!(client.flush(), Err(Error::Io(_))));

        failing.store(false, Ordering::SeqCst);
        client.increment("kept", 3, 1.0).unwrap();
        client.flush().unwrap();

        let datagrams = capture.datagrams();
        assert_eq!(datagrams.len(), 1);
        assert_eq!(datagrams[0].as_ref(), b"kept:3|c");
        assert_eq!(capture.next_line().as_deref(), Some("kept:3|c"));
        assert_eq!(capture.next_line(), None);

        let telemetry = client.telemetry();
        assert_eq!(telemetry.packets_dropped(), 1);
        assert_eq!(telemetry.packets_sent(), 1);
    }

    #[test]
    fn oversized_metric_rejected() {
        let (transport, capture) = Capture::new();
        let client = StatsdBuilder::default().with_max_packet_length(16).build_with_transport(transport);

        client.increment("ok", 1, 1.0).unwrap();
        let result = client.increment("much.too.long.for.this.packet", 1, 1.0);
        assert!(matches!(result, Err(Error::MetricTooLarge { max: 16, .. })));

        client.flush().unwrap();
        assert_eq!(capture.next_line().as_deref(), Some("ok:1|c"));
        assert_eq!(capture.next_line(), None);
    }

    #[test]
    fn drop_flushes_pending_metrics() {
        let (client, capture) = StatsdClient::capture();
        client.increment("incr", 1, 1.0).unwrap();
        drop(client);

        assert_eq!(capture.next_line().as_deref(), Some("incr:1|c"));
    }

    #[test]
    fn concurrent_emission() {
        let (client, capture) = StatsdClient::capture();
        let client = Arc::new(client);

        let handles = (0..8)
            .map(|i| {
                let client = Arc::clone(&client);
                thread::spawn(move || {
                    let stat = format!("worker{i}");
                    for _ in 0..250 {
                        client.increment(&stat, 1, 1.0).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        client.flush().unwrap();

        let mut counts = [0; 8];
        while let Some(line) = capture.next_line() {
            let worker = line
                .strip_prefix("worker")
                .and_then(|rest| rest.strip_suffix(":1|c"))
                .and_then(|i| i.parse::<usize>().ok())
                .expect("line should not be torn");
            counts[worker] += 1;
        }
        assert_eq!(counts, [250; 8]);
        assert!(capture.datagrams().iter().all(|d| d.len() <= 512));
    }

    #[test]
    fn usable_as_trait_object() {
        let (client, capture) = StatsdClient::capture();
        let client: Box<dyn StatsClient> = Box::new(client);
        client.gauge("gauge", 1, 1.0).unwrap();
        client.flush().unwrap();
        assert_eq!(capture.next_line().as_deref(), Some("gauge:1|g"));
    }
}
