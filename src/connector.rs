// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Connect/reconnect supervision with exponential backoff and cooperative
cancellation (§4.6).
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Tracks retry count and computes the next backoff delay for reconnect
/// attempts. Owns no socket or thread itself — `Session`/`Subscriber` call
/// [`Connector::next_delay`] between attempts and [`Connector::record_*`]
/// after each one.
pub struct Connector {
    max_retries: i32,
    retry_interval: Duration,
    max_retry_interval: Duration,
    auto_reconnect: bool,
    attempt: u32,
    connection_refused: AtomicBool,
    cancelled: AtomicBool,
}

impl Connector {
    /// Creates a connector with the given policy (§6 "Configuration
    /// inputs"). `max_retries` negative means infinite (§8).
    pub fn new(max_retries: i32, retry_interval: Duration, max_retry_interval: Duration, auto_reconnect: bool) -> Self {
        Self {
            max_retries,
            retry_interval,
            max_retry_interval,
            auto_reconnect,
            attempt: 0,
            connection_refused: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Resets the attempt counter; called after every user-initiated
    /// connect and every successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.connection_refused.store(false, Ordering::SeqCst);
    }

    /// Records a failed or lost connection. `refused` short-circuits
    /// further auto-reconnect until the next user-initiated connect (§4.6).
    pub fn record_failure(&mut self, refused: bool) {
        self.attempt = self.attempt.saturating_add(1);
        if refused {
            self.connection_refused.store(true, Ordering::SeqCst);
        }
    }

    /// `true` when another attempt should be scheduled: auto-reconnect is
    /// enabled, the connection was not refused, cancellation has not been
    /// requested, and the retry budget is not exhausted.
    pub fn should_retry(&self) -> bool {
        if !self.auto_reconnect || self.is_cancelled() || self.connection_refused.load(Ordering::SeqCst) {
            return false;
        }
        self.max_retries < 0 || (self.attempt as i32) <= self.max_retries
    }

    /// Delay before the next attempt: `min(max_retry_interval,
    /// retry_interval * 2^attempt)` (§4.6, scenario 5 in §8).
    pub fn next_delay(&self) -> Duration {
        let factor = 1u64.checked_shl(self.attempt).unwrap_or(u64::MAX);
        let scaled = self.retry_interval.as_secs_f64() * factor as f64;
        Duration::from_secs_f64(scaled.min(self.max_retry_interval.as_secs_f64()))
    }

    /// Requests cancellation; observed cooperatively by
    /// [`Connector::should_retry`] and by any in-progress backoff sleep.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// `true` once [`Connector::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clears cancellation; called at the start of a fresh user-initiated
    /// connect.
    pub fn uncancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Number of consecutive failed attempts recorded since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_retries_negative_one_never_gives_up() {
        let mut connector = Connector::new(-1, Duration::from_secs(1), Duration::from_secs(30), true);
        for _ in 0..1000 {
            connector.record_failure(false);
        }
        assert!(connector.should_retry());
    }

    #[test]
    fn max_retries_zero_gives_up_after_first_failure() {
        let mut connector = Connector::new(0, Duration::from_secs(1), Duration::from_secs(30), true);
        assert!(connector.should_retry());
        connector.record_failure(false);
        assert!(!connector.should_retry());
    }

    #[test]
    fn max_retries_k_performs_at_most_k_retries() {
        let k = 3;
        let mut connector = Connector::new(k, Duration::from_secs(1), Duration::from_secs(30), true);
        for _ in 0..k {
            assert!(connector.should_retry());
            connector.record_failure(false);
        }
        assert!(!connector.should_retry());
    }

    #[test]
    fn delay_doubles_until_the_ceiling() {
        let mut connector = Connector::new(-1, Duration::from_secs(1), Duration::from_secs(30), true);
        assert_eq!(connector.next_delay(), Duration::from_secs(1));
        connector.record_failure(false);
        assert_eq!(connector.next_delay(), Duration::from_secs(2));
        connector.record_failure(false);
        assert_eq!(connector.next_delay(), Duration::from_secs(4));
        for _ in 0..10 {
            connector.record_failure(false);
        }
        assert_eq!(connector.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn connection_refused_short_circuits_auto_reconnect() {
        let mut connector = Connector::new(-1, Duration::from_secs(1), Duration::from_secs(30), true);
        connector.record_failure(true);
        assert!(!connector.should_retry());
        connector.reset();
        assert!(connector.should_retry());
    }

    #[test]
    fn cancellation_stops_retries() {
        let connector = Connector::new(-1, Duration::from_secs(1), Duration::from_secs(30), true);
        assert!(connector.should_retry());
        connector.cancel();
        assert!(!connector.should_retry());
    }

    #[test]
    fn auto_reconnect_disabled_never_retries() {
        let connector = Connector::new(-1, Duration::from_secs(1), Duration::from_secs(30), false);
        assert!(!connector.should_retry());
    }
}
