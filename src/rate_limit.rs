//! # Rate Limiter
//!
//! Per-service fixed-window request accounting. Each service gets an
//! independent 60 second window; the first recorded request opens the
//! window and the count resets when it elapses. State is in-memory and
//! process-local, so limits are approximate across replicas.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::services::ServiceId;

/// Length of the fixed accounting window.
pub const WINDOW_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window rate limiter keyed by service.
pub struct RateLimiter {
    limits: HashMap<ServiceId, u32>,
    windows: Mutex<HashMap<ServiceId, Window>>,
}

impl RateLimiter {
    /// Build a limiter with an explicit per-service limit table.
    pub fn new(limits: HashMap<ServiceId, u32>) -> Self {
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn limit_for(&self, service: ServiceId) -> u32 {
        self.limits
            .get(&service)
            .copied()
            .unwrap_or_else(|| service.profile().rate_limit_per_minute)
    }

    /// Whether one more request to `service` would stay within its limit.
    ///
    /// Read-only: checking never consumes budget.
    pub fn check(&self, service: ServiceId) -> bool {
        self.check_at(service, Instant::now())
    }

    /// Count one dispatched request against the current window.
    pub fn record(&self, service: ServiceId) {
        self.record_at(service, Instant::now());
    }

    /// Requests left in the current window for `service`.
    pub fn remaining_in_window(&self, service: ServiceId) -> u32 {
        self.remaining_at(service, Instant::now())
    }

    /// Clear the window for one service, e.g. after a remote limit reset.
    pub fn reset(&self, service: ServiceId) {
        let mut windows = self.lock_windows();
        windows.remove(&service);
    }

    fn check_at(&self, service: ServiceId, now: Instant) -> bool {
        let limit = self.limit_for(service);
        let windows = self.lock_windows();
        match windows.get(&service) {
            Some(window) if now.duration_since(window.started_at) < WINDOW_DURATION => {
                window.count < limit
            }
            _ => limit > 0,
        }
    }

    fn record_at(&self, service: ServiceId, now: Instant) {
        let mut windows = self.lock_windows();
        match windows.get_mut(&service) {
            Some(window) if now.duration_since(window.started_at) < WINDOW_DURATION => {
                window.count += 1;
            }
            _ => {
                windows.insert(
                    service,
                    Window {
                        started_at: now,
                        count: 1,
                    },
                );
            }
        }
    }

    fn remaining_at(&self, service: ServiceId, now: Instant) -> u32 {
        let limit = self.limit_for(service);
        let windows = self.lock_windows();
        match windows.get(&service) {
            Some(window) if now.duration_since(window.started_at) < WINDOW_DURATION => {
                limit.saturating_sub(window.count)
            }
            _ => limit,
        }
    }

    fn lock_windows(&self) -> std::sync::MutexGuard<'_, HashMap<ServiceId, Window>> {
        // Counter state stays consistent even if a holder panicked.
        match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter_with(service: ServiceId, limit: u32) -> RateLimiter {
        let mut limits = HashMap::new();
        limits.insert(service, limit);
        RateLimiter::new(limits)
    }

    #[test]
    fn allows_up_to_limit_then_denies() {
        let limiter = limiter_with(ServiceId::Quoting, 3);
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at(ServiceId::Quoting, start));
            limiter.record_at(ServiceId::Quoting, start);
        }
        assert!(!limiter.check_at(ServiceId::Quoting, start));
    }

    #[test]
    fn window_expiry_resets_count() {
        let limiter = limiter_with(ServiceId::Quoting, 1);
        let start = Instant::now();

        limiter.record_at(ServiceId::Quoting, start);
        assert!(!limiter.check_at(ServiceId::Quoting, start));

        let later = start + WINDOW_DURATION;
        assert!(limiter.check_at(ServiceId::Quoting, later));
        limiter.record_at(ServiceId::Quoting, later);
        assert_eq!(limiter.remaining_at(ServiceId::Quoting, later), 0);
    }

    #[test]
    fn new_window_starts_at_count_one() {
        let limiter = limiter_with(ServiceId::Books, 5);
        let start = Instant::now();

        limiter.record_at(ServiceId::Books, start);
        let later = start + WINDOW_DURATION + Duration::from_secs(1);
        limiter.record_at(ServiceId::Books, later);
        assert_eq!(limiter.remaining_at(ServiceId::Books, later), 4);
    }

    #[test]
    fn services_have_independent_windows() {
        let mut limits = HashMap::new();
        limits.insert(ServiceId::Crm, 1);
        limits.insert(ServiceId::Desk, 1);
        let limiter = RateLimiter::new(limits);
        let now = Instant::now();

        limiter.record_at(ServiceId::Crm, now);
        assert!(!limiter.check_at(ServiceId::Crm, now));
        assert!(limiter.check_at(ServiceId::Desk, now));
    }

    #[test]
    fn check_does_not_consume_budget() {
        let limiter = limiter_with(ServiceId::Fsm, 1);
        let now = Instant::now();

        for _ in 0..10 {
            assert!(limiter.check_at(ServiceId::Fsm, now));
        }
        assert_eq!(limiter.remaining_at(ServiceId::Fsm, now), 1);
    }

    #[test]
    fn reset_clears_window() {
        let limiter = limiter_with(ServiceId::People, 1);
        let now = Instant::now();

        limiter.record_at(ServiceId::People, now);
        assert!(!limiter.check_at(ServiceId::People, now));
        limiter.reset(ServiceId::People);
        assert!(limiter.check_at(ServiceId::People, now));
    }

    #[test]
    fn unconfigured_service_falls_back_to_profile_default() {
        let limiter = RateLimiter::new(HashMap::new());
        assert_eq!(
            limiter.remaining_in_window(ServiceId::Crm),
            ServiceId::Crm.profile().rate_limit_per_minute
        );
    }
}
