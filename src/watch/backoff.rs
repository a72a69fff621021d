use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter that never runs out of attempts.
///
/// Each call to [`next_delay`](Backoff::next_delay) doubles the delay up to
/// `max`; [`reset`](Backoff::reset) starts over from `base`. A zero `base`
/// yields an immediate retry every time.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(
        base: Duration,
        max: Duration,
    ) -> Self {
        let base = base.min(max);
        Self {
            base,
            max,
            current: base,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);

        // Up to 25% jitter so registrations faulted together spread out
        let jitter_ms = (delay.as_millis() / 4) as u64;
        if jitter_ms == 0 {
            return delay;
        }
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        (delay + jitter).min(self.max)
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.base;
    }
}
