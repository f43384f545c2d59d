use std::time::Duration;

use tokio::time::Instant;

/// One side's game clock. The room owns both clocks and races their
/// deadlines in its event loop; a stopped clock has no deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    remaining: Duration,
    deadline: Option<Instant>,
}

impl Clock {
    pub fn new(remaining: Duration) -> Self {
        Clock {
            remaining,
            deadline: None,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arms the clock to fire once `remaining` has elapsed from now.
    pub fn start(&mut self) {
        self.deadline = Some(Instant::now() + self.remaining);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn charge(&mut self, elapsed: Duration) {
        self.remaining = self.remaining.saturating_sub(elapsed);
    }

    /// Stops the clock and restores a full allowance.
    pub fn reset(&mut self, remaining: Duration) {
        self.remaining = remaining;
        self.deadline = None;
    }
}

/// Completes at `deadline`, or never when there is none.
pub async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock_is_stopped() {
        let clock = Clock::new(Duration::from_secs(180));

        assert!(!clock.is_running());
        assert_eq!(clock.remaining(), Duration::from_secs(180));
    }

    #[test]
    fn test_charge_never_goes_negative() {
        let mut clock = Clock::new(Duration::from_secs(2));

        clock.charge(Duration::from_secs(5));

        assert_eq!(clock.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_clock_expires_after_remaining() {
        let mut clock = Clock::new(Duration::from_secs(3));
        let started = Instant::now();

        clock.start();
        expiry(clock.deadline()).await;

        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_clock_never_expires() {
        let clock = Clock::new(Duration::from_secs(1));

        let result = tokio::time::timeout(Duration::from_secs(60), expiry(clock.deadline())).await;

        assert!(result.is_err());
    }

    #[test]
    fn test_reset_restores_allowance_and_stops() {
        let mut clock = Clock::new(Duration::from_secs(60));
        clock.charge(Duration::from_secs(20));
        clock.start();

        clock.reset(Duration::from_secs(60));

        assert_eq!(clock.remaining(), Duration::from_secs(60));
        assert!(!clock.is_running());
    }
}
