//! Fixed-window request limiting, in process.
//!
//! One `RateLimiter` instance guards one endpoint; keys are client IPs. The
//! storefront runs as a single process, so the dashmap store is the whole
//! story — counters reset when the window lapses and an expiry sweep drops
//! idle keys.

use axum::http::{HeaderMap, HeaderValue};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_duration: Duration::from_secs(3_600),
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

/// Outcome of a quota check; carries everything the response layer needs for
/// the `X-RateLimit-*` headers.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset: Duration,
}

impl RateLimitDecision {
    /// Writes the standard quota headers onto a response.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("X-RateLimit-Limit", num_header(self.limit));
        headers.insert("X-RateLimit-Remaining", num_header(self.remaining));
        headers.insert("X-RateLimit-Reset", num_header(self.reset.as_secs()));
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    entries: Arc<DashMap<String, RateLimitEntry>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Checks and consumes one unit of quota for `key`.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry {
                count: 0,
                window_start: now,
            });

        if now.duration_since(entry.window_start) >= self.config.window_duration {
            entry.count = 0;
            entry.window_start = now;
        }

        let reset = self
            .config
            .window_duration
            .saturating_sub(now.duration_since(entry.window_start));

        if entry.count >= self.config.requests_per_window {
            return RateLimitDecision {
                allowed: false,
                limit: self.config.requests_per_window,
                remaining: 0,
                reset,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            limit: self.config.requests_per_window,
            remaining: self.config.requests_per_window.saturating_sub(entry.count),
            reset,
        }
    }

    /// Drops keys whose window has lapsed. Called periodically.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| {
            now.duration_since(entry.window_start) < self.config.window_duration
        });
    }
}

/// Extracts the client identity for rate limiting: first `X-Forwarded-For`
/// hop, then `X-Real-IP`, else a shared bucket.
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(ip) = forwarded_str.split(',').next() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.trim().to_string();
        }
    }

    "unknown".to_string()
}

fn num_header<T: ToString>(n: T) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exhaustion_denies_and_reports_zero_remaining() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 3,
            window_duration: Duration::from_secs(60),
        });

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("1.2.3.4");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.check("1.2.3.4");
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.reset <= Duration::from_secs(60));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_secs(60),
        });
        assert!(limiter.check("1.1.1.1").allowed);
        assert!(!limiter.check("1.1.1.1").allowed);
        assert!(limiter.check("2.2.2.2").allowed);
    }

    #[test]
    fn window_lapse_resets_quota() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_millis(20),
        });
        assert!(limiter.check("1.1.1.1").allowed);
        assert!(!limiter.check("1.1.1.1").allowed);
        std::thread::sleep(Duration::from_millis(25));
        assert!(limiter.check("1.1.1.1").allowed);
    }

    #[test]
    fn cleanup_drops_lapsed_windows() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_millis(10),
        });
        limiter.check("1.1.1.1");
        std::thread::sleep(Duration::from_millis(15));
        limiter.cleanup_expired();
        assert!(limiter.entries.is_empty());
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());
        assert_eq!(client_ip(&headers), "203.0.113.7");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());
        assert_eq!(client_ip(&headers), "10.0.0.2");

        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }
}
