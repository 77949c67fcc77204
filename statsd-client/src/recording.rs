//! A client that records the operations called on it, for asserting on in tests.
//!
//! [`RecordingClient`] works at the level of the [`StatsClient`] calls rather than the bytes on the wire, which is
//! usually what code under test cares about:
//!
//! ```
//! use statsd_client::{
//!     recording::{Operation, RecordingClient, StatsCommand},
//!     StatsClient as _,
//! };
//!
//! let client = RecordingClient::new();
//! client.increment("requests", 2, 1.0).unwrap();
//! client.decrement("requests", 1, 1.0).unwrap();
//!
//! client.assert_stat(&StatsCommand::new(Operation::Increment, "requests", 2, 1.0));
//! client.assert_value("requests", 1);
//! client.assert_logged("requests");
//! ```
use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{client::StatsClient, error::Error, prefix::normalize_prefix};

/// Operation recorded by a [`RecordingClient`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// [`StatsClient::increment`].
    Increment,

    /// [`StatsClient::decrement`].
    Decrement,

    /// [`StatsClient::duration`], and [`StatsClient::time`].
    Duration,

    /// [`StatsClient::timing`].
    Timing,

    /// [`StatsClient::gauge`].
    Gauge,

    /// [`StatsClient::increment_gauge`].
    IncrementGauge,

    /// [`StatsClient::decrement_gauge`].
    DecrementGauge,

    /// [`StatsClient::unique`].
    Unique,
}

/// A single recorded metric operation.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsCommand {
    /// The operation that was called.
    pub operation: Operation,

    /// The stat name, without any prefix.
    pub stat: String,

    /// The value passed to the operation. Durations are recorded in nanoseconds.
    pub value: i64,

    /// The sample rate passed to the operation.
    pub sample_rate: f64,
}

impl StatsCommand {
    /// Creates a new `StatsCommand`.
    pub fn new<S>(operation: Operation, stat: S, value: i64, sample_rate: f64) -> Self
    where
        S: Into<String>,
    {
        Self { operation, stat: stat.into(), value, sample_rate }
    }
}

#[derive(Default)]
struct Recorded {
    prefix: String,
    commands: VecDeque<StatsCommand>,
    values: HashMap<String, i64>,
    closed: bool,
}

impl Recorded {
    fn record<F>(&mut self, command: StatsCommand, update: F)
    where
        F: FnOnce(Option<i64>) -> i64,
    {
        let value = update(self.values.get(&command.stat).copied());
        self.values.insert(command.stat.clone(), value);
        self.commands.push_back(command);
    }
}

/// A client that records every operation instead of sending anything.
///
/// Each operation is logged as a [`StatsCommand`], in order, and also folded into a running value per stat:
/// counters and gauge deltas accumulate, while gauges, timings, and set members replace the value. Timings and
/// durations are accumulated as whole milliseconds.
///
/// Sampling is not applied, and every operation succeeds, including after [`close`](StatsClient::close).
#[derive(Default)]
pub struct RecordingClient {
    recorded: Mutex<Recorded>,
}

impl RecordingClient {
    /// Creates a new, empty `RecordingClient`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the commands recorded so far that haven't been consumed by [`assert_stat`](Self::assert_stat).
    pub fn commands(&self) -> Vec<StatsCommand> {
        self.recorded.lock().commands.iter().cloned().collect()
    }

    /// Returns the accumulated value of `stat`, or `None` if it was never recorded.
    pub fn value(&self, stat: &str) -> Option<i64> {
        self.recorded.lock().values.get(stat).copied()
    }

    /// Returns `true` if any operation was recorded for `stat`.
    pub fn logged(&self, stat: &str) -> bool {
        self.recorded.lock().values.contains_key(stat)
    }

    /// Returns the current key prefix, normalized as a real client would.
    pub fn prefix(&self) -> String {
        self.recorded.lock().prefix.clone()
    }

    /// Returns `true` if the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.recorded.lock().closed
    }

    /// Asserts that `expected` is the oldest recorded command, and consumes it.
    ///
    /// # Panics
    ///
    /// Panics if no command was recorded, or if the oldest one differs from `expected`.
    #[track_caller]
    pub fn assert_stat(&self, expected: &StatsCommand) {
        let actual = self.recorded.lock().commands.pop_front();
        match actual {
            Some(actual) => assert_eq!(&actual, expected, "got {actual:?} stat, expected {expected:?}"),
            None => panic!("no stat was recorded, expected {expected:?}"),
        }
    }

    /// Asserts that the accumulated value of `stat` is `expected`.
    ///
    /// # Panics
    ///
    /// Panics if `stat` was never recorded, or if its value differs from `expected`.
    #[track_caller]
    pub fn assert_value(&self, stat: &str, expected: i64) {
        match self.value(stat) {
            Some(actual) => assert_eq!(actual, expected, "got {actual} for stat {stat:?}, expected {expected}"),
            None => panic!("expected stat {stat:?} to be logged"),
        }
    }

    /// Asserts that any operation was recorded for `stat`.
    ///
    /// # Panics
    ///
    /// Panics if `stat` was never recorded.
    #[track_caller]
    pub fn assert_logged(&self, stat: &str) {
        assert!(self.logged(stat), "expected stat {stat:?} to be logged");
    }

    fn record<F>(&self, operation: Operation, stat: &str, value: i64, rate: f64, update: F) -> Result<(), Error>
    where
        F: FnOnce(Option<i64>) -> i64,
    {
        let command = StatsCommand::new(operation, stat, value, rate);
        self.recorded.lock().record(command, update);
        Ok(())
    }
}

fn saturating_i64<N>(value: N) -> i64
where
    N: TryInto<i64>,
{
    value.try_into().unwrap_or(i64::MAX)
}

fn whole_millis(elapsed: Duration) -> i64 {
    saturating_i64(elapsed.as_millis())
}

impl StatsClient for RecordingClient {
    fn set_prefix(&self, prefix: &str) {
        self.recorded.lock().prefix = normalize_prefix(prefix);
    }

    fn increment(&self, stat: &str, count: i64, rate: f64) -> Result<(), Error> {
        self.record(Operation::Increment, stat, count, rate, |v| v.unwrap_or(0).saturating_add(count))
    }

    fn decrement(&self, stat: &str, count: i64, rate: f64) -> Result<(), Error> {
        self.record(Operation::Decrement, stat, count, rate, |v| v.unwrap_or(0).saturating_sub(count))
    }

    fn duration(&self, stat: &str, elapsed: Duration, rate: f64) -> Result<(), Error> {
        let nanos = saturating_i64(elapsed.as_nanos());
        self.record(Operation::Duration, stat, nanos, rate, |_| whole_millis(elapsed))
    }

    fn timing(&self, stat: &str, millis: u64, rate: f64) -> Result<(), Error> {
        let millis = saturating_i64(millis);
        self.record(Operation::Timing, stat, millis, rate, |_| millis)
    }

    fn gauge(&self, stat: &str, value: i64, rate: f64) -> Result<(), Error> {
        self.record(Operation::Gauge, stat, value, rate, |_| value)
    }

    fn increment_gauge(&self, stat: &str, value: u64, rate: f64) -> Result<(), Error> {
        let value = saturating_i64(value);
        self.record(Operation::IncrementGauge, stat, value, rate, |v| v.unwrap_or(0).saturating_add(value))
    }

    fn decrement_gauge(&self, stat: &str, value: u64, rate: f64) -> Result<(), Error> {
        let value = saturating_i64(value);
        self.record(Operation::DecrementGauge, stat, value, rate, |v| v.unwrap_or(0).saturating_sub(value))
    }

    fn unique(&self, stat: &str, value: i64, rate: f64) -> Result<(), Error> {
        self.record(Operation::Unique, stat, value, rate, |_| value)
    }

    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        self.recorded.lock().closed = true;
        Ok(())
    }
}
