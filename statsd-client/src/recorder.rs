use std::sync::Arc;

use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder,
    SharedString, Unit,
};
use tracing::warn;

use crate::{
    client::StatsdClient,
    error::Error,
    transport::{RemoteTransport, Transport},
    writer::{Metric, Sign},
};

/// A [`metrics`] recorder that sends metrics through a [`StatsdClient`].
///
/// Metrics are not aggregated: every counter increment, gauge update, and histogram sample is encoded as its own
/// line and buffered by the client straight away.
///
/// - counters are sent as counters (`|c`), and absolute counter values as gauges (`|g`)
/// - gauges are sent as gauges, with increments and decrements sent as signed deltas
/// - histograms are sent as timings (`|ms`)
///
/// StatsD reads any signed gauge value as a delta, so setting a gauge to a negative value sends a reset to zero
/// followed by a negative delta, in the same packet. NaN and infinite values have no StatsD representation and are
/// dropped.
///
/// Plain StatsD has no notion of labels, so they are dropped. Errors cannot be returned through the `metrics` handles,
/// so they are logged instead.
pub struct StatsdRecorder<T: Transport = RemoteTransport> {
    client: Arc<StatsdClient<T>>,
}

impl<T: Transport> StatsdRecorder<T> {
    /// Creates a new `StatsdRecorder` sending through `client`.
    pub fn new(client: Arc<StatsdClient<T>>) -> Self {
        StatsdRecorder { client }
    }

    /// Returns the client backing this recorder.
    pub fn client(&self) -> &Arc<StatsdClient<T>> {
        &self.client
    }

    fn handle(&self, key: &Key) -> Arc<Handle<T>> {
        Arc::new(Handle { name: key.name().to_owned(), client: Arc::clone(&self.client) })
    }
}

impl<T: Transport + 'static> Recorder for StatsdRecorder<T> {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.handle(key))
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(self.handle(key))
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(self.handle(key))
    }
}

struct Handle<T: Transport> {
    name: String,
    client: Arc<StatsdClient<T>>,
}

impl<T: Transport> Handle<T> {
    fn send(&self, metric: Metric<'_>) {
        if let Err(e) = self.client.send(metric, 1.0) {
            report_error(&self.name, &e);
        }
    }

    fn send_group(&self, metrics: &[Metric<'_>]) {
        if let Err(e) = self.client.send_group(metrics) {
            report_error(&self.name, &e);
        }
    }

    fn is_finite(&self, value: f64) -> bool {
        if !value.is_finite() {
            warn!(metric_name = self.name.as_str(), value, "Dropping non-finite metric value.");
        }
        value.is_finite()
    }

    fn send_gauge_delta(&self, delta: f64) {
        if self.is_finite(delta) {
            let sign = if delta < 0.0 { Sign::Minus } else { Sign::Plus };
            self.send(Metric::float_gauge(&self.name, delta.abs(), Some(sign)));
        }
    }
}

fn report_error(metric_name: &str, e: &Error) {
    warn!(metric_name, error = %e, "Failed to send metric.");
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl<T: Transport> CounterFn for Handle<T> {
    fn increment(&self, value: u64) {
        self.send(Metric::counter(&self.name, saturating_i64(value)));
    }

    fn absolute(&self, value: u64) {
        self.send(Metric::gauge(&self.name, saturating_i64(value)));
    }
}

impl<T: Transport> GaugeFn for Handle<T> {
    fn increment(&self, value: f64) {
        self.send_gauge_delta(value);
    }

    fn decrement(&self, value: f64) {
        self.send_gauge_delta(-value);
    }

    fn set(&self, value: f64) {
        if !self.is_finite(value) {
            return;
        }

        if value < 0.0 {
            self.send_group(&[
                Metric::gauge(&self.name, 0),
                Metric::float_gauge(&self.name, value.abs(), Some(Sign::Minus)),
            ]);
        } else {
            // `abs` also turns -0.0 into 0.0, which would otherwise be read as a delta.
            self.send(Metric::float_gauge(&self.name, value.abs(), None));
        }
    }
}

impl<T: Transport> HistogramFn for Handle<T> {
    fn record(&self, value: f64) {
        if self.is_finite(value) {
            self.send(Metric::float_timing(&self.name, value));
        }
    }
}
