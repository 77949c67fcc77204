const SEPARATOR: char = '.';

/// Normalizes a key prefix so that it ends in exactly one separator.
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches(SEPARATOR);

    let mut normalized = String::with_capacity(trimmed.len() + 1);
    normalized.push_str(trimmed);
    normalized.push(SEPARATOR);
    normalized
}

/// Builds a key prefix out of the given segments.
///
/// Any `.` within a segment is replaced with `_`, so that each segment stays a single level of the key hierarchy, and
/// the segments are then joined with `.`. This is handy for segments such as hostnames:
///
/// ```
/// use statsd_client::make_prefix;
///
/// assert_eq!(
///     make_prefix(&["test", "statsdclient", "test.example.com"]),
///     "test.statsdclient.test_example_com"
/// );
/// ```
pub fn make_prefix<S>(segments: &[S]) -> String
where
    S: AsRef<str>,
{
    segments
        .iter()
        .map(|segment| segment.as_ref().replace(SEPARATOR, "_"))
        .collect::<Vec<_>>()
        .join(".")
}
