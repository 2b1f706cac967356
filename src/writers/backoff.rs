//! Randomized backoff for reconnecting writers

use rand::Rng;
use std::time::Duration;

/// Maximum number of backoff steps
pub const MAX_BACKOFF_STEPS: u32 = 7;

/// Delay per backoff step
pub const BACKOFF_UNIT: Duration = Duration::from_millis(50);

/// Bounded step counter producing jittered delays
///
/// Each failure moves one step up (capped at [`MAX_BACKOFF_STEPS`]) and
/// yields a random delay in `[0, step) * BACKOFF_UNIT`.
#[derive(Debug, Clone, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Back to step zero after a healthy cycle
    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Increase the step and pick the next delay
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        if self.step < MAX_BACKOFF_STEPS {
            self.step += 1;
        }
        BACKOFF_UNIT * rng.gen_range(0..self.step)
    }

    /// Upper bound of any delay this backoff can produce
    pub fn max_delay() -> Duration {
        BACKOFF_UNIT * (MAX_BACKOFF_STEPS - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_step_is_capped() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut backoff = Backoff::new();

        for expected in 1..=MAX_BACKOFF_STEPS {
            backoff.next_delay(&mut rng);
            assert_eq!(backoff.step(), expected);
        }
        for _ in 0..20 {
            backoff.next_delay(&mut rng);
            assert_eq!(backoff.step(), MAX_BACKOFF_STEPS);
        }
    }

    #[test]
    fn test_delay_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut backoff = Backoff::new();

        // First step can only produce zero
        assert_eq!(backoff.next_delay(&mut rng), Duration::ZERO);

        for _ in 0..200 {
            let delay = backoff.next_delay(&mut rng);
            assert!(delay <= Backoff::max_delay(), "delay {:?} too long", delay);
            assert_eq!(delay.as_millis() % BACKOFF_UNIT.as_millis(), 0);
        }
    }

    #[test]
    fn test_reset() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut backoff = Backoff::new();
        backoff.next_delay(&mut rng);
        backoff.next_delay(&mut rng);
        backoff.reset();
        assert_eq!(backoff.step(), 0);
    }
}
