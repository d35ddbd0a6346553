//! Per-user sliding-window rate limiter.
//!
//! Each user has a queue of accepted-message timestamps. Entries older than
//! the window are pruned before every check; once the queue holds `limit`
//! entries further messages are refused (and not recorded) until the oldest
//! one ages out. State is in-memory only and resets on restart.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::relay::types::UserId;

/// Default messages allowed per window.
pub const DEFAULT_RATE_LIMIT: usize = 6;

/// Default window length.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window counter keyed by user.
pub struct RateLimiter {
    limit: usize,
    window: chrono::Duration,
    windows: HashMap<UserId, VecDeque<DateTime<Utc>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::seconds(60)),
            windows: HashMap::new(),
        }
    }

    /// Returns `true` and records `now` if the user is under the limit.
    pub fn check_and_record(&mut self, user: UserId, now: DateTime<Utc>) -> bool {
        let window = self.windows.entry(user).or_default();
        prune(window, now, self.window);

        if window.len() >= self.limit {
            debug!(user_id = %user, count = window.len(), "Rate limit hit");
            return false;
        }
        window.push_back(now);
        true
    }

    /// Drop windows whose entries have all aged out. Returns how many users
    /// were removed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        let span = self.window;
        self.windows.retain(|_, window| {
            prune(window, now, span);
            !window.is_empty()
        });
        before - self.windows.len()
    }

    /// Number of users with a live window.
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}

fn prune(window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, span: chrono::Duration) {
    while let Some(oldest) = window.front() {
        if now - *oldest >= span {
            window.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn seventh_message_in_window_is_refused() {
        let mut rl = RateLimiter::default();
        let user = UserId(1);
        for i in 0..6 {
            assert!(rl.check_and_record(user, t0() + chrono::Duration::seconds(i)));
        }
        assert!(!rl.check_and_record(user, t0() + chrono::Duration::seconds(10)));
    }

    #[test]
    fn window_reopens_after_61_seconds() {
        let mut rl = RateLimiter::default();
        let user = UserId(1);
        for _ in 0..6 {
            assert!(rl.check_and_record(user, t0()));
        }
        assert!(!rl.check_and_record(user, t0() + chrono::Duration::seconds(30)));
        assert!(rl.check_and_record(user, t0() + chrono::Duration::seconds(61)));
    }

    #[test]
    fn refused_messages_are_not_recorded() {
        let mut rl = RateLimiter::new(2, Duration::from_secs(60));
        let user = UserId(1);
        assert!(rl.check_and_record(user, t0()));
        assert!(rl.check_and_record(user, t0() + chrono::Duration::seconds(1)));
        for i in 2..50 {
            assert!(!rl.check_and_record(user, t0() + chrono::Duration::seconds(i)));
        }
        // Only the two accepted timestamps count, so one frees up at t0+60.
        assert!(rl.check_and_record(user, t0() + chrono::Duration::seconds(60)));
    }

    #[test]
    fn users_are_independent() {
        let mut rl = RateLimiter::new(1, Duration::from_secs(60));
        assert!(rl.check_and_record(UserId(1), t0()));
        assert!(!rl.check_and_record(UserId(1), t0()));
        assert!(rl.check_and_record(UserId(2), t0()));
    }

    #[test]
    fn sweep_drops_idle_windows() {
        let mut rl = RateLimiter::default();
        rl.check_and_record(UserId(1), t0());
        rl.check_and_record(UserId(2), t0() + chrono::Duration::seconds(50));
        assert_eq!(rl.tracked_users(), 2);

        assert_eq!(rl.sweep(t0() + chrono::Duration::seconds(70)), 1);
        assert_eq!(rl.tracked_users(), 1);
    }
}
