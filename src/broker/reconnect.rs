//! Reconnection policy (spec §4.7): exponential backoff with a ceiling,
//! plus a trip-after-N-consecutive-failures circuit breaker. Two presets
//! cover the data-feed connection (patient, rarely tripped) and the
//! order-execution connection (impatient, trips sooner since a broken
//! order path needs a human faster than a broken data path does).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    trip_after: u32,
    consecutive_failures: u32,
    current_backoff: Duration,
    state: CircuitState,
}

impl ReconnectionPolicy {
    pub fn new(initial_backoff: Duration, max_backoff: Duration, multiplier: f64, trip_after: u32) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            multiplier,
            trip_after,
            consecutive_failures: 0,
            current_backoff: initial_backoff,
            state: CircuitState::Closed,
        }
    }

    /// Data broker preset (spec §4.7): 1s initial, 5m ceiling, x2.0,
    /// trips after 10 consecutive failures.
    pub fn data_broker_default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300), 2.0, 10)
    }

    /// Order broker preset (spec §4.7): 0.5s initial, 2m ceiling, x1.5,
    /// trips after 15 consecutive failures.
    pub fn order_broker_default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(120), 1.5, 15)
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Call after a failed connection attempt. Returns the delay to wait
    /// before the next attempt, or `None` if the breaker has tripped.
    pub fn on_failure(&mut self) -> Option<Duration> {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.trip_after {
            self.state = CircuitState::Open;
            return None;
        }
        let wait = self.current_backoff;
        let next_millis = (self.current_backoff.as_millis() as f64 * self.multiplier) as u64;
        self.current_backoff = Duration::from_millis(next_millis).min(self.max_backoff);
        Some(wait)
    }

    /// Resets backoff and closes the circuit after a successful connect.
    pub fn on_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_backoff = self.initial_backoff;
        self.state = CircuitState::Closed;
    }

    /// Manually closes a tripped breaker (admin-triggered reconnect).
    pub fn reset(&mut self) {
        self.on_success();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_ceiling() {
        let mut policy = ReconnectionPolicy::new(Duration::from_secs(1), Duration::from_secs(10), 2.0, 100);
        assert_eq!(policy.on_failure(), Some(Duration::from_secs(1)));
        assert_eq!(policy.on_failure(), Some(Duration::from_secs(2)));
        assert_eq!(policy.on_failure(), Some(Duration::from_secs(4)));
        assert_eq!(policy.on_failure(), Some(Duration::from_secs(8)));
        assert_eq!(policy.on_failure(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn breaker_trips_after_threshold() {
        let mut policy = ReconnectionPolicy::new(Duration::from_millis(1), Duration::from_secs(1), 2.0, 3);
        policy.on_failure();
        policy.on_failure();
        assert_eq!(policy.state(), CircuitState::Closed);
        assert_eq!(policy.on_failure(), None);
        assert_eq!(policy.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_backoff_and_closes_circuit() {
        let mut policy = ReconnectionPolicy::new(Duration::from_secs(1), Duration::from_secs(10), 2.0, 2);
        policy.on_failure();
        policy.on_failure();
        assert_eq!(policy.state(), CircuitState::Open);
        policy.on_success();
        assert_eq!(policy.state(), CircuitState::Closed);
        assert_eq!(policy.on_failure(), Some(Duration::from_secs(1)));
    }
}
