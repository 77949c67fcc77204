use std::time::Duration;

use crate::sampling::{Sampler, Sampling};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MetricType {
    Counter,
    Gauge,
    Timing,
    Set,
}

impl MetricType {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            MetricType::Counter => b"|c",
            MetricType::Gauge => b"|g",
            MetricType::Timing => b"|ms",
            MetricType::Set => b"|s",
        }
    }
}

/// Explicit sign for gauge deltas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Sign {
    Plus,
    Minus,
}

impl Sign {
    fn as_byte(self) -> u8 {
        match self {
            Sign::Plus => b'+',
            Sign::Minus => b'-',
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum MetricValue {
    Integer(i64),
    Unsigned(u64),
    #[cfg(feature = "recorder")]
    FloatingPoint(f64),
    Duration(Duration),
}

struct MetricValueFormatter {
    int_writer: itoa::Buffer,
    #[cfg(feature = "recorder")]
    float_writer: ryu::Buffer,
    duration_buf: String,
}

impl MetricValueFormatter {
    fn new() -> Self {
        Self {
            int_writer: itoa::Buffer::new(),
            #[cfg(feature = "recorder")]
            float_writer: ryu::Buffer::new(),
            duration_buf: String::new(),
        }
    }

    fn format(&mut self, value: MetricValue) -> &str {
        match value {
            MetricValue::Integer(v) => self.int_writer.format(v),
            MetricValue::Unsigned(v) => self.int_writer.format(v),
            #[cfg(feature = "recorder")]
            MetricValue::FloatingPoint(v) => self.float_writer.format(v),
            MetricValue::Duration(d) => {
                // Milliseconds with microsecond-and-below precision, always six decimal places.
                self.duration_buf = format!("{:.6}", d.as_secs_f64() * 1000.0);
                &self.duration_buf
            }
        }
    }
}

/// A single metric event, prior to encoding.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Metric<'a> {
    stat: &'a str,
    value: MetricValue,
    sign: Option<Sign>,
    metric_type: MetricType,
}

impl<'a> Metric<'a> {
    const fn new(stat: &'a str, value: MetricValue, metric_type: MetricType) -> Self {
        Self { stat, value, sign: None, metric_type }
    }

    pub const fn counter(stat: &'a str, count: i64) -> Self {
        Self::new(stat, MetricValue::Integer(count), MetricType::Counter)
    }

    /// Counter of `-count`, without overflowing for `i64::MIN`.
    pub const fn negated_counter(stat: &'a str, count: i64) -> Self {
        match count.checked_neg() {
            Some(negated) => Self::counter(stat, negated),
            // Only `i64::MIN` overflows, and its negation is `2^63`.
            None => Self::new(stat, MetricValue::Unsigned(count.unsigned_abs()), MetricType::Counter),
        }
    }

    pub const fn gauge(stat: &'a str, value: i64) -> Self {
        Self::new(stat, MetricValue::Integer(value), MetricType::Gauge)
    }

    pub const fn gauge_delta(stat: &'a str, sign: Sign, magnitude: u64) -> Self {
        Self {
            stat,
            value: MetricValue::Unsigned(magnitude),
            sign: Some(sign),
            metric_type: MetricType::Gauge,
        }
    }

    pub const fn timing(stat: &'a str, millis: u64) -> Self {
        Self::new(stat, MetricValue::Unsigned(millis), MetricType::Timing)
    }

    pub const fn duration(stat: &'a str, elapsed: Duration) -> Self {
        Self::new(stat, MetricValue::Duration(elapsed), MetricType::Timing)
    }

    pub const fn set(stat: &'a str, value: i64) -> Self {
        Self::new(stat, MetricValue::Integer(value), MetricType::Set)
    }

    #[cfg(feature = "recorder")]
    pub fn float_gauge(stat: &'a str, value: f64, sign: Option<Sign>) -> Self {
        Self { stat, value: MetricValue::FloatingPoint(value), sign, metric_type: MetricType::Gauge }
    }

    #[cfg(feature = "recorder")]
    pub fn float_timing(stat: &'a str, millis: f64) -> Self {
        Self::new(stat, MetricValue::FloatingPoint(millis), MetricType::Timing)
    }

    /// Encodes the metric into a line, or returns `None` if sampling suppressed it.
    ///
    /// The line does not include the key prefix, which is only known once the client lock is held.
    pub fn encode(&self, rate: f64, sampler: &dyn Sampler) -> Option<Line> {
        match Sampling::decide(rate, sampler) {
            Sampling::Dropped => None,
            Sampling::Unsampled => Some(self.encode_with_rate(None)),
            Sampling::Sampled(rate) => Some(self.encode_with_rate(Some(rate))),
        }
    }

    fn encode_with_rate(&self, maybe_sample_rate: Option<f64>) -> Line {
        let mut formatter = MetricValueFormatter::new();
        let value_str = formatter.format(self.value);

        let mut buf = Vec::with_capacity(self.stat.len() + value_str.len() + 16);
        buf.extend_from_slice(self.stat.as_bytes());
        buf.push(b':');
        if let Some(sign) = self.sign {
            buf.push(sign.as_byte());
        }
        buf.extend_from_slice(value_str.as_bytes());
        buf.extend_from_slice(self.metric_type.as_bytes());

        // The rate is only written when sampled, as 1.0 is the implied default.
        if let Some(sample_rate) = maybe_sample_rate {
            buf.extend_from_slice(b"|@");
            buf.extend_from_slice(format_sample_rate(sample_rate).as_bytes());
        }

        Line { buf }
    }
}

/// Shortest decimal text that round-trips the rate, never in exponent notation.
fn format_sample_rate(rate: f64) -> String {
    rate.to_string()
}

/// An encoded metric line, without prefix or trailing delimiter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Line {
    buf: Vec<u8>,
}

impl Line {
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Metric, Sign};
    use crate::sampling::FixedSampler;

    fn encode(metric: Metric<'_>, rate: f64) -> Option<String> {
        metric
            .encode(rate, &FixedSampler(0.0))
            .map(|line| String::from_utf8(line.as_bytes().to_vec()).unwrap())
    }

    #[test]
    fn counter() {
        let cases = [
            (Metric::counter("incr", 1), 1.0, "incr:1|c"),
            (Metric::counter("decr", -1), 1.0, "decr:-1|c"),
            (Metric::counter("incr", 1), 0.99, "incr:1|c|@0.99"),
            (Metric::counter("incr", 1), 0.99901, "incr:1|c|@0.99901"),
            (Metric::counter("incr", 1), 0.0001, "incr:1|c|@0.0001"),
            (Metric::counter("incr", 42), 2.5, "incr:42|c"),
            (Metric::negated_counter("decr", 1), 1.0, "decr:-1|c"),
            (Metric::negated_counter("decr", -3), 1.0, "decr:3|c"),
            (Metric::negated_counter("decr", i64::MAX), 1.0, "decr:-9223372036854775807|c"),
            (Metric::negated_counter("decr", i64::MIN), 1.0, "decr:9223372036854775808|c"),
        ];

        for (metric, rate, expected) in cases {
            assert_eq!(encode(metric, rate).as_deref(), Some(expected));
        }
    }

    #[test]
    fn gauge() {
        let cases = [
            (Metric::gauge("gauge", 300), "gauge:300|g"),
            (Metric::gauge_delta("gauge", Sign::Plus, 10), "gauge:+10|g"),
            (Metric::gauge_delta("gauge", Sign::Minus, 4), "gauge:-4|g"),
            (Metric::gauge_delta("gauge", Sign::Plus, 0), "gauge:+0|g"),
        ];

        for (metric, expected) in cases {
            assert_eq!(encode(metric, 1.0).as_deref(), Some(expected));
        }
    }

    #[test]
    fn timing() {
        let cases = [
            (Metric::timing("timing", 350), "timing:350|ms"),
            (Metric::duration("timing", Duration::from_nanos(123_456_789)), "timing:123.456789|ms"),
            (Metric::duration("timing", Duration::from_secs(10)), "timing:10000.000000|ms"),
            (Metric::duration("timing", Duration::from_nanos(50)), "timing:0.000050|ms"),
            (Metric::duration("timing", Duration::ZERO), "timing:0.000000|ms"),
        ];

        for (metric, expected) in cases {
            assert_eq!(encode(metric, 1.0).as_deref(), Some(expected));
        }
    }

    #[test]
    fn set() {
        assert_eq!(encode(Metric::set("unique", 765), 1.0).as_deref(), Some("unique:765|s"));
    }

    #[cfg(feature = "recorder")]
    #[test]
    fn floating_point() {
        let cases = [
            (Metric::float_gauge("gauge", 42.0, None), "gauge:42.0|g"),
            (Metric::float_gauge("gauge", 3.13232, Some(Sign::Plus)), "gauge:+3.13232|g"),
            (Metric::float_gauge("gauge", 1.5, Some(Sign::Minus)), "gauge:-1.5|g"),
            (Metric::float_timing("latency", 12.25), "latency:12.25|ms"),
        ];

        for (metric, expected) in cases {
            assert_eq!(encode(metric, 1.0).as_deref(), Some(expected));
        }
    }

    #[test]
    fn suppressed_by_sampling() {
        // A draw that is not strictly below the rate suppresses the line.
        let line = Metric::counter("incr", 1).encode(0.5, &FixedSampler(0.5));
        assert!(line.is_none());

        let line = Metric::counter("incr", 1).encode(0.0, &FixedSampler(0.0));
        assert!(line.is_none());

        let line = Metric::counter("incr", 1).encode(f64::NAN, &FixedSampler(0.0));
        assert!(line.is_none());
    }

    #[test]
    fn stat_is_not_escaped() {
        let line = encode(Metric::counter("weird key:with|bytes", 1), 1.0);
        assert_eq!(line.as_deref(), Some("weird key:with|bytes:1|c"));
    }
}
