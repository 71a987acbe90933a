//! Fixed-window rate limiter keyed by masked IP prefix.
//!
//! Addresses are grouped by subnet before counting: IPv4 by /24 and IPv6 by
//! /48, so a client rotating through its /64 still lands on one counter.
//! Counters live in a bounded LRU; each entry expires one window after it
//! was created, at which point the next request starts a fresh count.

use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ipnet::IpNet;
use lru::LruCache;
use parking_lot::Mutex;

/// Number of distinct prefixes tracked before the least recently used is evicted.
pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(65_536) {
    Some(v) => v,
    None => unreachable!(),
};
pub const DEFAULT_LIMIT: i64 = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const IPV4_PREFIX_LEN: u8 = 24;
pub const IPV6_PREFIX_LEN: u8 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Limited,
}

#[derive(Debug)]
struct Counter {
    hits: Arc<AtomicI64>,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    visitors: Mutex<LruCache<IpNet, Counter>>,
    limit: i64,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(limit: i64, window: Duration) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, limit, window)
    }

    pub fn with_capacity(capacity: NonZeroUsize, limit: i64, window: Duration) -> Self {
        Self {
            visitors: Mutex::new(LruCache::new(capacity)),
            limit,
            window,
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The subnet a request is counted against.
    pub fn masked_prefix(ip: IpAddr) -> IpNet {
        let ip = ip.to_canonical();
        let bits = match ip {
            IpAddr::V4(_) => IPV4_PREFIX_LEN,
            IpAddr::V6(_) => IPV6_PREFIX_LEN,
        };
        IpNet::new(ip, bits)
            .map(|net| net.trunc())
            .unwrap_or_else(|_| IpNet::from(ip))
    }

    pub fn check(&self, ip: IpAddr) -> Admission {
        self.check_at(ip, Instant::now())
    }

    /// Count one request from `ip` at `now` and decide whether to admit it.
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> Admission {
        let prefix = Self::masked_prefix(ip);

        // The lock only covers the lookup; the increment itself is atomic.
        let hits = {
            let mut visitors = self.visitors.lock();
            match visitors.get(&prefix) {
                Some(counter) if counter.expires_at > now => Arc::clone(&counter.hits),
                _ => {
                    let hits = Arc::new(AtomicI64::new(0));
                    visitors.put(
                        prefix,
                        Counter {
                            hits: Arc::clone(&hits),
                            expires_at: now + self.window,
                        },
                    );
                    hits
                }
            }
        };

        if hits.fetch_add(1, Ordering::Relaxed) + 1 > self.limit {
            Admission::Limited
        } else {
            Admission::Admitted
        }
    }

    /// Drop every expired counter. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut visitors = self.visitors.lock();
        let expired: Vec<IpNet> = visitors
            .iter()
            .filter(|(_, counter)| counter.expires_at <= now)
            .map(|(prefix, _)| *prefix)
            .collect();
        for prefix in &expired {
            visitors.pop(prefix);
        }
        expired.len()
    }

    pub fn tracked_prefixes(&self) -> usize {
        self.visitors.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().expect("valid ip")
    }

    #[test]
    fn request_over_limit_is_rejected_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..3 {
            assert_eq!(limiter.check_at(ip("1.2.3.4"), start), Admission::Admitted);
        }
        assert_eq!(limiter.check_at(ip("1.2.3.4"), start), Admission::Limited);
    }

    #[test]
    fn counter_resets_after_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.check_at(ip("1.2.3.4"), start);
        }
        let later = start + Duration::from_secs(61);
        assert_eq!(limiter.check_at(ip("1.2.3.4"), later), Admission::Admitted);
    }

    #[test]
    fn ipv4_addresses_in_same_slash_24_share_a_counter() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(limiter.check_at(ip("10.0.0.1"), now), Admission::Admitted);
        assert_eq!(limiter.check_at(ip("10.0.0.200"), now), Admission::Admitted);
        assert_eq!(limiter.check_at(ip("10.0.0.17"), now), Admission::Limited);
        assert_eq!(limiter.check_at(ip("10.0.1.1"), now), Admission::Admitted);
    }

    #[test]
    fn ipv6_rotation_inside_slash_48_is_counted_together() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(limiter.check_at(ip("2001:db8:1:1::1"), now), Admission::Admitted);
        assert_eq!(limiter.check_at(ip("2001:db8:1:2::1"), now), Admission::Admitted);
        assert_eq!(limiter.check_at(ip("2001:db8:1:ffff::9"), now), Admission::Limited);
        assert_eq!(limiter.check_at(ip("2001:db8:2::1"), now), Admission::Admitted);
    }

    #[test]
    fn masked_prefix_truncates_host_bits() {
        assert_eq!(
            RateLimiter::masked_prefix(ip("192.168.7.99")).to_string(),
            "192.168.7.0/24"
        );
        assert_eq!(
            RateLimiter::masked_prefix(ip("2001:db8:abcd:12::1")).to_string(),
            "2001:db8:abcd::/48"
        );
    }

    #[test]
    fn least_recently_used_prefix_is_evicted_at_capacity() {
        let capacity = NonZeroUsize::new(2).expect("non-zero");
        let limiter = RateLimiter::with_capacity(capacity, 1, Duration::from_secs(60));
        let now = Instant::now();

        limiter.check_at(ip("10.0.1.1"), now);
        limiter.check_at(ip("10.0.2.1"), now);
        limiter.check_at(ip("10.0.3.1"), now);
        assert_eq!(limiter.tracked_prefixes(), 2);

        // 10.0.1.0/24 was evicted, so its count starts over.
        assert_eq!(limiter.check_at(ip("10.0.1.1"), now), Admission::Admitted);
    }

    #[test]
    fn purge_removes_only_expired_entries() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let start = Instant::now();

        limiter.check_at(ip("10.0.1.1"), start);
        limiter.check_at(ip("10.0.2.1"), start + Duration::from_secs(5));

        assert_eq!(limiter.purge_expired(start + Duration::from_secs(11)), 1);
        assert_eq!(limiter.tracked_prefixes(), 1);
    }

    #[test]
    fn concurrent_requests_are_all_counted() {
        let limiter = Arc::new(RateLimiter::new(1_000, Duration::from_secs(60)));
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        limiter.check_at(ip("172.16.0.1"), now);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }

        assert_eq!(limiter.check_at(ip("172.16.0.1"), now), Admission::Admitted);
        for _ in 0..199 {
            limiter.check_at(ip("172.16.0.1"), now);
        }
        assert_eq!(limiter.check_at(ip("172.16.0.1"), now), Admission::Limited);
    }
}
