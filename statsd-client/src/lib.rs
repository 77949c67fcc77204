//! A buffered client for sending metrics to a [StatsD][statsd]-compatible server.
//!
//! [statsd]: https://github.com/statsd/statsd
//!
//! # Usage
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use statsd_client::{StatsClient as _, StatsdBuilder};
//!
//! // The builder can configure the remote address, the maximum packet length, the key prefix, and so on.
//! let client = StatsdBuilder::default()
//!     .with_remote_address("127.0.0.1:8125")
//!     .expect("failed to parse remote address")
//!     .with_prefix("my_service")
//!     .build()
//!     .expect("failed to build client");
//!
//! client.increment("requests", 1, 1.0)?;
//! client.duration("request_time", Duration::from_millis(42), 0.1)?;
//! client.gauge("connections", 12, 1.0)?;
//!
//! // Metrics are buffered until a packet is full, so flush when done, or periodically.
//! client.flush()?;
//! client.close()?;
//! # Ok::<(), statsd_client::Error>(())
//! ```
//!
//! # Wire format
//!
//! Each metric is encoded as a single line of the form `<prefix><stat>:<value>|<type>[|@<rate>]`, where the type is one
//! of `c` (counter), `g` (gauge), `ms` (timing), or `s` (set). Gauge deltas carry an explicit `+` or `-` sign.
//!
//! # Features
//!
//! ## Multi-metric packets
//!
//! Lines are packed into packets of up to a configurable size, separated by newlines, which cuts down on the number of
//! datagrams (and system calls) needed to send a batch of metrics. A packet is sent when the next line would not fit,
//! or when the client is flushed, closed, or dropped.
//!
//! ## Sampling
//!
//! Every operation takes a sample rate. Below 1.0, metrics are sent with that probability, and the rate is included so
//! that the server can scale counts back up. The source of randomness can be replaced with a [`Sampler`].
//!
//! ## Fire and forget
//!
//! Packets are sent as datagrams, and are never retried. A server that is down or unreachable does not cause errors:
//! the packets simply go nowhere.
//!
//! ## Testing
//!
//! [`StatsdClient::capture`] creates a client whose packets are recorded in memory and can be read back one line at a
//! time. [`RecordingClient`] records the operations called on it along with a running value per stat, and
//! [`NoopClient`] discards everything.
//!
//! ## `metrics` support
//!
//! With the `recorder` feature (enabled by default), [`StatsdRecorder`] adapts a client into a [`metrics`] recorder, and
//! [`StatsdBuilder::install`] installs one globally.
//!
//! # Missing
//!
//! ## Tags
//!
//! DogStatsD-style tags (`|#key:value`) and timestamps are not supported.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod buffer;
pub use self::buffer::DEFAULT_MAX_PACKET_LEN;

mod builder;
pub use self::builder::{BuildError, StatsdBuilder};

pub mod capture;
pub use self::capture::{Capture, CaptureClient, CaptureTransport};

mod client;
pub use self::client::{StatsClient, StatsdClient};

mod error;
pub use self::error::Error;

mod noop;
pub use self::noop::NoopClient;

mod prefix;
pub use self::prefix::make_prefix;

#[cfg(feature = "recorder")]
mod recorder;
#[cfg(feature = "recorder")]
pub use self::recorder::StatsdRecorder;

pub mod recording;
pub use self::recording::RecordingClient;

mod sampling;
pub use self::sampling::{FixedSampler, RngSampler, Sampler, ThreadRngSampler};

mod telemetry;
pub use self::telemetry::Telemetry;

pub mod transport;
pub use self::transport::{RemoteTransport, Transport, UdpTransport};

mod writer;
