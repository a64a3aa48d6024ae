use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use dashmap::DashMap;

/// Fixed-window request counter keyed by an arbitrary string (`ip|email`).
///
/// State lives in process memory only; separate instances do not share
/// counts.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    buckets: DashMap<String, Bucket>,
}

struct Bucket {
    count: u32,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: DashMap::new(),
        }
    }

    /// Counts one request for `key`; returns false once the window is exhausted.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut bucket = self.buckets.entry(key.to_string()).or_insert(Bucket {
            count: 0,
            window_start: now,
        });
        if now.duration_since(bucket.window_start) > self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }
        bucket.count += 1;
        bucket.count <= self.max_requests
    }

    /// Drops buckets whose window has fully elapsed.
    pub fn purge_stale(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| now.duration_since(b.window_start) <= self.window);
        before - self.buckets.len()
    }
}

pub fn limiter_key(ip: &str, email: &str) -> String {
    format!("{}|{}", ip, email)
}

/// First hop of `x-forwarded-for`, when present.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_limit_and_resets_after_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("1.2.3.4|a@b.co", t0));
        }
        assert!(!limiter.check_at("1.2.3.4|a@b.co", t0));
        assert!(limiter.check_at("1.2.3.4|other@b.co", t0));

        let later = t0 + Duration::from_secs(61);
        assert!(limiter.check_at("1.2.3.4|a@b.co", later));
    }

    #[test]
    fn purge_drops_only_elapsed_buckets() {
        let limiter = RateLimiter::new(3, Duration::from_millis(0));
        limiter.check("k1");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(limiter.purge_stale(), 1);
    }

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);
        headers.insert("x-forwarded-for", "10.0.0.7, 172.16.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.7"));
    }
}
