//! Randomized pauses between surface actions

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Produces uniformly random pauses within a bound
///
/// Clones share one generator, so a seeded generator stays deterministic
/// across every component that pauses.
#[derive(Debug, Clone)]
pub struct DelayGenerator {
    rng: Arc<Mutex<StdRng>>,
}

impl DelayGenerator {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic generator for tests and reproducible pacing
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Whether both handles draw from the same generator
    pub fn shares_state(&self, other: &DelayGenerator) -> bool {
        Arc::ptr_eq(&self.rng, &other.rng)
    }

    /// Pick a duration in `[min_ms, max_ms]`; inverted bounds are swapped
    pub fn pick(&self, min_ms: u64, max_ms: u64) -> Duration {
        let (low, high) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        if low == high {
            return Duration::from_millis(low);
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_millis(rng.random_range(low..=high))
    }

    /// Wait for a random duration in `[min_ms, max_ms]`
    pub async fn sleep(&self, min_ms: u64, max_ms: u64) {
        let pause = self.pick(min_ms, max_ms);
        if pause.is_zero() {
            return;
        }
        debug!("Pausing {:?}", pause);
        tokio::time::sleep(pause).await;
    }
}

impl Default for DelayGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Pause bounds in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Pacing {
    pub const NONE: Pacing = Pacing { min_ms: 0, max_ms: 0 };

    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_stays_in_bounds() {
        let delays = DelayGenerator::seeded(7);
        for _ in 0..500 {
            let pause = delays.pick(100, 250);
            assert!(pause >= Duration::from_millis(100));
            assert!(pause <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_pick_degenerate_and_inverted_bounds() {
        let delays = DelayGenerator::seeded(7);
        assert_eq!(delays.pick(40, 40), Duration::from_millis(40));

        let pause = delays.pick(300, 100);
        assert!(pause >= Duration::from_millis(100) && pause <= Duration::from_millis(300));
    }

    #[test]
    fn test_seeded_generators_agree() {
        let a = DelayGenerator::seeded(42);
        let b = DelayGenerator::seeded(42);
        let picks_a: Vec<_> = (0..10).map(|_| a.pick(0, 10_000)).collect();
        let picks_b: Vec<_> = (0..10).map(|_| b.pick(0, 10_000)).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn test_clones_share_state() {
        let delays = DelayGenerator::seeded(5);
        assert!(delays.clone().shares_state(&delays));
        assert!(!DelayGenerator::seeded(5).shares_state(&delays));
    }

    #[tokio::test]
    async fn test_zero_sleep_returns_immediately() {
        let started = std::time::Instant::now();
        DelayGenerator::seeded(1).sleep(0, 0).await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_sleep_waits_at_least_min() {
        let started = std::time::Instant::now();
        DelayGenerator::seeded(1).sleep(20, 30).await;
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
