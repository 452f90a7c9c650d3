use std::time::Duration;

use rand::Rng;

/// Delay between whole-run retries: doubles per attempt up to `max`, and only the
/// upper half of that window is randomized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        let floor = ceiling / 2;
        Duration::from_millis(rng.gen_range(floor..=ceiling))
    }

    /// Un-jittered delay for `attempt` (counted from 0).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let factor = 1u64 << attempt.min(20);
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn backoff() -> Backoff {
        Backoff::new(Duration::from_secs(30), Duration::from_secs(600))
    }

    #[test]
    fn ceiling_doubles_until_capped() {
        let ceilings: Vec<_> = (0..7).map(|a| backoff().ceiling(a).as_secs()).collect();
        assert_eq!(ceilings, vec![30, 60, 120, 240, 480, 600, 600]);
    }

    #[test]
    fn jittered_delay_stays_in_upper_half() {
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 0..8 {
            let ceiling = backoff().ceiling(attempt);
            let delay = backoff().delay_with_rng(attempt, &mut rng);
            assert!(delay <= ceiling, "attempt {attempt}: {delay:?} > {ceiling:?}");
            assert!(delay >= ceiling / 2, "attempt {attempt}: {delay:?} too short");
        }
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        assert_eq!(backoff().ceiling(u32::MAX), Duration::from_secs(600));
    }

    #[test]
    fn max_below_base_is_raised_to_base() {
        let backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(backoff.ceiling(3), Duration::from_secs(10));
    }
}
