//! Rate Limiter
//!
//! In-memory per-process sliding window: at most N admitted attempts per
//! window per (user, action). Evaluated before any database lock so a capped
//! caller fails fast. Cross-process coordination is not required at the
//! deployed scale.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::clock::Clock;
use crate::errors::{CoreError, CoreResult};
use crate::settings::RateCap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateAction {
    PlaceBid,
    CancelAuction,
    RemoveBid,
    BulkRemoveBids,
}

pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<(i64, RateAction), VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject an attempt. Admitted attempts are recorded; rejected
    /// ones are not, so a capped user recovers as soon as the window slides.
    pub fn check(&self, user_id: i64, action: RateAction, cap: RateCap) -> CoreResult<()> {
        let now = self.clock.now();
        let window = Duration::seconds(cap.window_secs as i64);

        let mut windows = self.windows.lock();
        let attempts = windows.entry((user_id, action)).or_default();
        while let Some(oldest) = attempts.front() {
            if now - *oldest >= window {
                attempts.pop_front();
            } else {
                break;
            }
        }

        if attempts.len() >= cap.max_attempts as usize {
            let retry_after = attempts
                .front()
                .map(|oldest| (*oldest + window - now).num_seconds().max(1))
                .unwrap_or(cap.window_secs as i64);
            return Err(CoreError::rate_limited(retry_after));
        }

        attempts.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::ErrorCode;
    use chrono::TimeZone;

    fn limiter() -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap());
        (RateLimiter::new(Arc::new(clock.clone())), clock)
    }

    const CAP: RateCap = RateCap {
        max_attempts: 3,
        window_secs: 60,
    };

    #[test]
    fn admits_up_to_cap_then_rejects() {
        let (limiter, _clock) = limiter();
        for _ in 0..3 {
            limiter.check(1, RateAction::PlaceBid, CAP).unwrap();
        }
        let err = limiter.check(1, RateAction::PlaceBid, CAP).unwrap_err();
        assert_eq!(err.code, ErrorCode::TooManyRequests);
    }

    #[test]
    fn window_slides() {
        let (limiter, clock) = limiter();
        for _ in 0..3 {
            limiter.check(1, RateAction::PlaceBid, CAP).unwrap();
        }
        clock.advance(Duration::seconds(59));
        assert!(limiter.check(1, RateAction::PlaceBid, CAP).is_err());
        clock.advance(Duration::seconds(2));
        assert!(limiter.check(1, RateAction::PlaceBid, CAP).is_ok());
    }

    #[test]
    fn users_and_actions_are_independent() {
        let (limiter, _clock) = limiter();
        for _ in 0..3 {
            limiter.check(1, RateAction::PlaceBid, CAP).unwrap();
        }
        assert!(limiter.check(2, RateAction::PlaceBid, CAP).is_ok());
        assert!(limiter.check(1, RateAction::RemoveBid, CAP).is_ok());
    }

    #[test]
    fn rejection_reports_retry_after() {
        let (limiter, _clock) = limiter();
        for _ in 0..3 {
            limiter.check(1, RateAction::PlaceBid, CAP).unwrap();
        }
        let err = limiter.check(1, RateAction::PlaceBid, CAP).unwrap_err();
        assert!(err.message.contains("retry after"));
    }
}
