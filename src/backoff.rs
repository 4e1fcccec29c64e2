//! Retry delay policy for failed loads.
//!
//! Exponential backoff with multiplicative jitter. The delay doubles
//! with every consecutive failure, is capped, and is randomized so a
//! batch of objects that failed together does not retry in lockstep.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct UpdateBackoff {
    pub initial: Duration,
    pub cap: Duration,
    /// Relative jitter span; 0.2 means the delay varies by up to 20%
    /// in either direction.
    pub jitter: f64,
}

impl Default for UpdateBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            cap: Duration::from_secs(600),
            jitter: 0.2,
        }
    }
}

impl UpdateBackoff {
    /// Delay before the retry after `error_count` consecutive failures.
    pub fn delay(&self, error_count: u64, rng: &mut impl Rng) -> Duration {
        if error_count == 0 {
            return self.initial;
        }

        // Doublings beyond 2^6 are indistinguishable once the cap kicks in.
        let exponent = (error_count - 1).min(6) as i32;
        let exact = self.initial.as_secs_f64() * 2f64.powi(exponent);
        let capped = exact.min(self.cap.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            capped * (1.0 + (rng.gen::<f64>() * 2.0 - 1.0) * self.jitter)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.max(self.initial.as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn delay_grows_with_error_count() {
        let backoff = UpdateBackoff {
            initial: Duration::from_secs(1),
            cap: Duration::from_secs(3600),
            jitter: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(7);

        let d1 = backoff.delay(1, &mut rng);
        let d2 = backoff.delay(2, &mut rng);
        let d4 = backoff.delay(4, &mut rng);
        assert_eq!(d1, Duration::from_secs(1));
        assert_eq!(d2, Duration::from_secs(2));
        assert_eq!(d4, Duration::from_secs(8));
    }

    #[test]
    fn cap_is_respected() {
        let backoff = UpdateBackoff {
            initial: Duration::from_secs(5),
            cap: Duration::from_secs(60),
            jitter: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(backoff.delay(20, &mut rng), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let backoff = UpdateBackoff {
            initial: Duration::from_secs(10),
            cap: Duration::from_secs(600),
            jitter: 0.2,
        };
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let d = backoff.delay(2, &mut rng).as_secs_f64();
            assert!((16.0..=24.0).contains(&d), "delay {d} out of bounds");
        }
    }

    #[test]
    fn delay_never_drops_below_initial() {
        let backoff = UpdateBackoff {
            initial: Duration::from_secs(10),
            cap: Duration::from_secs(600),
            jitter: 0.9,
        };
        let mut rng = StdRng::seed_from_u64(42);

        for count in 1..10 {
            assert!(backoff.delay(count, &mut rng) >= backoff.initial);
        }
    }
}
