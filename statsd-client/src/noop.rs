use std::time::Duration;

use crate::{client::StatsClient, error::Error};

/// A client that does nothing.
///
/// Every operation succeeds without sending anything, which makes `NoopClient` a convenient default when metrics are
/// disabled, or in tests that don't care about them.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopClient;

impl StatsClient for NoopClient {
    fn set_prefix(&self, _: &str) {}

    fn increment(&self, _: &str, _: i64, _: f64) -> Result<(), Error> {
        Ok(())
    }

    fn decrement(&self, _: &str, _: i64, _: f64) -> Result<(), Error> {
        Ok(())
    }

    fn duration(&self, _: &str, _: Duration, _: f64) -> Result<(), Error> {
        Ok(())
    }

    fn timing(&self, _: &str, _: u64, _: f64) -> Result<(), Error> {
        Ok(())
    }

    fn gauge(&self, _: &str, _: i64, _: f64) -> Result<(), Error> {
        Ok(())
    }

    fn increment_gauge(&self, _: &str, _: u64, _: f64) -> Result<(), Error> {
        Ok(())
    }

    fn decrement_gauge(&self, _: &str, _: u64, _: f64) -> Result<(), Error> {
        Ok(())
    }

    fn unique(&self, _: &str, _: i64, _: f64) -> Result<(), Error> {
        Ok(())
    }

    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}
