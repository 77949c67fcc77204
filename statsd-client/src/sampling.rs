use parking_lot::Mutex;
use rand::Rng;

/// A source of uniformly distributed values in `[0, 1)` used to decide whether a sampled metric is sent.
///
/// Clients draw exactly one value per metric whose sample rate is below 1.0. Swapping the sampler allows making sampled
/// emission deterministic, which is mostly useful in tests.
pub trait Sampler: Send + Sync {
    /// Draws a value in `[0, 1)`.
    fn sample(&self) -> f64;
}

/// Sampler backed by the thread-local random number generator.
///
/// This is the default sampler.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRngSampler;

impl Sampler for ThreadRngSampler {
    fn sample(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Sampler that always draws the same value.
///
/// `FixedSampler(0.0)` accepts every metric with a positive sample rate, while `FixedSampler(1.0)` rejects every metric
/// whose sample rate is below 1.0.
#[derive(Clone, Copy, Debug)]
pub struct FixedSampler(pub f64);

impl Sampler for FixedSampler {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Sampler backed by an arbitrary random number generator, such as a seeded one.
pub struct RngSampler<R> {
    rng: Mutex<R>,
}

impl<R> RngSampler<R>
where
    R: Rng + Send,
{
    /// Creates a new `RngSampler` drawing from `rng`.
    pub fn new(rng: R) -> Self {
        Self { rng: Mutex::new(rng) }
    }
}

impl<R> Sampler for RngSampler<R>
where
    R: Rng + Send,
{
    fn sample(&self) -> f64 {
        self.rng.lock().random::<f64>()
    }
}

/// Outcome of applying a sample rate to a single metric.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Sampling {
    /// The rate is 1.0 or above: always sent, without a rate suffix.
    Unsampled,

    /// The draw fell below the rate: sent, with the rate appended.
    Sampled(f64),

    /// The draw did not fall below the rate: not sent.
    Dropped,
}

impl Sampling {
    pub fn decide(rate: f64, sampler: &dyn Sampler) -> Self {
        if rate >= 1.0 {
            return Sampling::Unsampled;
        }

        // NaN compares false against everything, so it is always dropped.
        if sampler.sample() < rate {
            Sampling::Sampled(rate)
        } else {
            Sampling::Dropped
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_xoshiro::Xoshiro256StarStar;

    use super::{FixedSampler, RngSampler, Sampler, Sampling, ThreadRngSampler};

    #[test]
    fn unsampled_never_draws() {
        struct PanickingSampler;

        impl Sampler for PanickingSampler {
            fn sample(&self) -> f64 {
                panic!("sampler should not be consulted for rates >= 1.0");
            }
        }

        assert_eq!(Sampling::decide(1.0, &PanickingSampler), Sampling::Unsampled);
        assert_eq!(Sampling::decide(7.0, &PanickingSampler), Sampling::Unsampled);
    }

    #[test]
    fn draw_must_be_strictly_below_rate() {
        assert_eq!(Sampling::decide(0.5, &FixedSampler(0.25)), Sampling::Sampled(0.5));
        assert_eq!(Sampling::decide(0.5, &FixedSampler(0.5)), Sampling::Dropped);
        assert_eq!(Sampling::decide(0.0, &FixedSampler(0.0)), Sampling::Dropped);
        assert_eq!(Sampling::decide(-1.0, &FixedSampler(0.0)), Sampling::Dropped);
        assert_eq!(Sampling::decide(f64::NAN, &FixedSampler(0.0)), Sampling::Dropped);
    }

    #[test]
    fn thread_rng_stays_in_range() {
        let sampler = ThreadRngSampler;
        for _ in 0..10_000 {
            let value = sampler.sample();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn seeded_sampler_tracks_rate() {
        let sampler = RngSampler::new(Xoshiro256StarStar::seed_from_u64(0x5747_5344));

        let iterations = 100_000;
        let accepted = (0..iterations)
            .filter(|_| matches!(Sampling::decide(0.25, &sampler), Sampling::Sampled(_)))
            .count();

        let observed = accepted as f64 / f64::from(iterations);
        assert!((observed - 0.25).abs() < 0.01, "observed rate {observed} too far from 0.25");
    }

    #[test]
    fn seeded_sampler_is_deterministic() {
        let a = RngSampler::new(Xoshiro256StarStar::seed_from_u64(42));
        let b = RngSampler::new(Xoshiro256StarStar::seed_from_u64(42));

        for _ in 0..64 {
            assert_eq!(a.sample().to_bits(), b.sample().to_bits());
        }
    }
}
