use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::models::error::AppError;

const IDLE_BUCKET_SECS: u64 = 300;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        TokenBucket {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, elapsed_secs: f64, capacity: f64, refill_per_sec: f64) {
        self.tokens = (self.tokens + elapsed_secs * refill_per_sec).min(capacity);
    }

    fn try_consume(&mut self, capacity: f64, refill_per_sec: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.refill(elapsed, capacity, refill_per_sec);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn seconds_until_token(&self, refill_per_sec: f64) -> u64 {
        ((1.0 - self.tokens) / refill_per_sec).ceil().max(1.0) as u64
    }
}

/// Token-bucket limiter keyed by client IP. Every relayed request spends
/// vendor credits, so the proxy throttles callers itself instead of waiting
/// for the vendor to push back.
pub struct RateLimiter {
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
    capacity: f64,
    refill_per_sec: f64,
}

impl RateLimiter {
    /// `per_minute` is both the burst capacity and the sustained rate.
    pub fn new(per_minute: u32) -> Self {
        let capacity = f64::from(per_minute.max(1));
        RateLimiter {
            buckets: Mutex::new(HashMap::new()),
            capacity,
            refill_per_sec: capacity / 60.0,
        }
    }

    pub fn check(&self, client: IpAddr) -> Result<(), AppError> {
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(client)
            .or_insert_with(|| TokenBucket::new(self.capacity));
        if bucket.try_consume(self.capacity, self.refill_per_sec) {
            Ok(())
        } else {
            let retry_after = bucket.seconds_until_token(self.refill_per_sec);
            debug!(client = %client, retry_after, "Rate limit exceeded");
            Err(AppError::RateLimited { retry_after })
        }
    }

    /// Drops buckets idle long enough to have fully refilled.
    pub fn cleanup(&self) {
        let mut buckets = self.buckets.lock();
        buckets.retain(|_, bucket| bucket.last_refill.elapsed().as_secs() < IDLE_BUCKET_SECS);
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn allows_burst_up_to_capacity() {
        let limiter = RateLimiter::new(3);
        for _ in 0..3 {
            assert!(limiter.check(ip(1)).is_ok());
        }
        assert!(matches!(
            limiter.check(ip(1)),
            Err(AppError::RateLimited { .. })
        ));
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let limiter = RateLimiter::new(2);
        limiter.check(ip(2)).unwrap();
        limiter.check(ip(2)).unwrap();
        match limiter.check(ip(2)) {
            Err(AppError::RateLimited { retry_after }) => assert!(retry_after >= 1),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn clients_are_limited_independently() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check(ip(3)).is_ok());
        assert!(limiter.check(ip(3)).is_err());
        assert!(limiter.check(ip(4)).is_ok());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn refill_restores_tokens_over_time() {
        let mut bucket = TokenBucket::new(10.0);
        bucket.tokens = 0.0;
        bucket.refill(30.0, 10.0, 10.0 / 60.0);
        assert!((bucket.tokens - 5.0).abs() < 1e-9);
        bucket.refill(600.0, 10.0, 10.0 / 60.0);
        assert_eq!(bucket.tokens, 10.0);
    }

    #[test]
    fn cleanup_keeps_recent_buckets() {
        let limiter = RateLimiter::new(5);
        limiter.check(ip(5)).unwrap();
        limiter.cleanup();
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
