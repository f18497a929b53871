//! In-memory rate limiters
//!
//! - `LoginRateLimiter`: failed logins per username (5 per 15 minutes) and
//!   auth requests per IP address (10 per minute)
//! - `GenerationRateLimiter`: AI generation requests per user per minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

const USERNAME_WINDOW_MINUTES: i64 = 15;
const USERNAME_MAX_FAILURES: usize = 5;
const IP_WINDOW_MINUTES: i64 = 1;
const IP_MAX_REQUESTS: usize = 10;

/// Timestamps of recent events per key
struct SlidingWindow<K> {
    events: Arc<RwLock<HashMap<K, Vec<DateTime<Utc>>>>>,
    window: Duration,
}

impl<K: Eq + Hash + Clone> SlidingWindow<K> {
    fn new(window: Duration) -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
            window,
        }
    }

    async fn count(&self, key: &K) -> usize {
        let mut events = self.events.write().await;
        let cutoff = Utc::now() - self.window;
        match events.get_mut(key) {
            Some(times) => {
                times.retain(|time| *time > cutoff);
                times.len()
            }
            None => 0,
        }
    }

    async fn record(&self, key: K) {
        let mut events = self.events.write().await;
        events.entry(key).or_default().push(Utc::now());
    }

    /// Record only if fewer than `max` events are inside the window
    async fn try_record(&self, key: K, max: usize) -> bool {
        let mut events = self.events.write().await;
        let now = Utc::now();
        let cutoff = now - self.window;
        let times = events.entry(key).or_default();
        times.retain(|time| *time > cutoff);
        if times.len() >= max {
            return false;
        }
        times.push(now);
        true
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut events = self.events.write().await;
        events.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    username_attempts: SlidingWindow<String>,
    ip_attempts: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            username_attempts: SlidingWindow::new(Duration::minutes(USERNAME_WINDOW_MINUTES)),
            ip_attempts: SlidingWindow::new(Duration::minutes(IP_WINDOW_MINUTES)),
        }
    }

    /// Whether the username has too many recent failed logins
    pub async fn is_username_limited(&self, username: &str) -> bool {
        self.username_attempts.count(&username.to_lowercase()).await >= USERNAME_MAX_FAILURES
    }

    pub async fn record_failed_attempt(&self, username: &str) {
        self.username_attempts.record(username.to_lowercase()).await;
    }

    /// Called on successful login
    pub async fn clear_username_attempts(&self, username: &str) {
        self.username_attempts.clear(&username.to_lowercase()).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.ip_attempts.count(&ip).await >= IP_MAX_REQUESTS
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ip_attempts.record(ip).await;
    }

    /// Drop expired entries; called from the periodic cleanup task
    pub async fn cleanup(&self) {
        self.username_attempts.cleanup().await;
        self.ip_attempts.cleanup().await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-user cap on generation requests in a one-minute sliding window
pub struct GenerationRateLimiter {
    requests: SlidingWindow<i64>,
    per_minute: usize,
}

impl GenerationRateLimiter {
    pub fn new(per_minute: usize) -> Self {
        Self {
            requests: SlidingWindow::new(Duration::minutes(1)),
            per_minute,
        }
    }

    /// Count a request for `user_id`; false when the user is over the limit
    pub async fn check(&self, user_id: i64) -> bool {
        if self.per_minute == 0 {
            return true;
        }
        self.requests.try_record(user_id, self.per_minute).await
    }

    pub async fn cleanup(&self) {
        self.requests.cleanup().await;
    }
}
