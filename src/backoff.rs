//! Jittered linear backoff between retry attempts.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Computes the delay before the next attempt of
/// [`Connection::execute`](crate::Connection::execute).
///
/// `delay(n) = base / 2 + U[0, 1) × base × n`, where `n` is the 1-based number of the attempt
/// that just failed. Delays grow linearly and are randomized so that clients retrying against
/// the same device drift apart.
pub struct Backoff {
    base: Duration,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl Backoff {
    /// Backoff with an entropy-seeded random source.
    pub fn new(base: Duration) -> Self {
        Self::with_rng(base, StdRng::from_entropy())
    }

    /// Backoff with a deterministic random source.
    pub fn seeded(base: Duration, seed: u64) -> Self {
        Self::with_rng(base, StdRng::seed_from_u64(seed))
    }

    /// Backoff drawing its jitter from `rng`.
    pub fn with_rng(base: Duration, rng: impl RngCore + Send + 'static) -> Self {
        Self { base, rng: Mutex::new(Box::new(rng)) }
    }

    /// Delay to wait after attempt number `attempt` (1-based) has failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter: f64 = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.r#gen::<f64>()
        };
        self.base / 2 + self.base.mul_f64(jitter * f64::from(attempt))
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backoff").field("base", &self.base).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn test_delay_bounds_grow_with_attempt() {
        let base = Duration::from_millis(500);
        let backoff = Backoff::seeded(base, 7);
        for attempt in 1..=5u32 {
            for _ in 0..50 {
                let delay = backoff.delay(attempt);
                assert!(delay >= base / 2);
                assert!(delay < base / 2 + base * attempt);
            }
        }
    }

    #[test]
    fn test_zero_jitter_gives_half_base() {
        // StepRng(0, 0) always yields zero, so the random factor is 0.0.
        let backoff = Backoff::with_rng(Duration::from_millis(500), StepRng::new(0, 0));
        assert_eq!(backoff.delay(1), Duration::from_millis(250));
        assert_eq!(backoff.delay(3), Duration::from_millis(250));
    }

    #[test]
    fn test_seeded_backoff_is_reproducible() {
        let base = Duration::from_millis(100);
        let a = Backoff::seeded(base, 42);
        let b = Backoff::seeded(base, 42);
        let delays_a: Vec<_> = (1..=4).map(|n| a.delay(n)).collect();
        let delays_b: Vec<_> = (1..=4).map(|n| b.delay(n)).collect();
        assert_eq!(delays_a, delays_b);
    }

    #[test]
    fn test_zero_base_never_sleeps() {
        let backoff = Backoff::new(Duration::ZERO);
        assert_eq!(backoff.delay(10), Duration::ZERO);
    }
}
