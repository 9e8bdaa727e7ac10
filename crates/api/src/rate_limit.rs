//! Fixed-window rate limiting backed by the cache store.
//!
//! Counter state lives in the injected cache rather than a module-level map,
//! so limits survive process restarts whenever the cache tier does. When the
//! cache is down the limiter fails open: blocking legitimate shoppers is
//! worse than letting a burst through.

use std::time::Duration;

use axum::http::HeaderMap;
use cache::Cache;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The request may proceed.
    Allowed,
    /// The caller is over budget for this window.
    Limited { retry_after_secs: u64 },
}

#[derive(Debug, Serialize, Deserialize)]
struct WindowState {
    count: u32,
    window_started_at: DateTime<Utc>,
}

/// Per-caller fixed-window counter.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Cache,
    max_attempts: u32,
    window: Duration,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_attempts` per `window` per caller key.
    pub fn new(cache: Cache, max_attempts: u32, window: Duration) -> Self {
        Self {
            cache,
            max_attempts,
            window,
        }
    }

    /// Counts one attempt for the caller under the scope and decides.
    pub async fn check(&self, scope: &str, caller: &str) -> RateLimitDecision {
        let key = format!("ratelimit:{scope}:{caller}");
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::seconds(60));

        // A cache failure reads as a miss here, which starts a fresh window
        // and allows the request: fail-open by construction.
        let state = match self.cache.get_json::<WindowState>(&key).await {
            Some(state) if now < state.window_started_at + window => state,
            _ => WindowState {
                count: 0,
                window_started_at: now,
            },
        };

        if state.count >= self.max_attempts {
            metrics::counter!("rate_limited_total").increment(1);
            let window_ends = state.window_started_at + window;
            let retry_after_secs = (window_ends - now).num_seconds().max(1) as u64;
            return RateLimitDecision::Limited { retry_after_secs };
        }

        let remaining = (state.window_started_at + window - now)
            .to_std()
            .unwrap_or(self.window);
        self.cache
            .set_json(
                &key,
                &WindowState {
                    count: state.count + 1,
                    window_started_at: state.window_started_at,
                },
                remaining,
            )
            .await;

        RateLimitDecision::Allowed
    }
}

/// Derives the caller key from connection headers plus an optional validated
/// session token.
///
/// Proxy-forwarded addresses are preferred; direct connections without any
/// forwarding header share the `"direct"` bucket.
pub fn caller_key(headers: &HeaderMap, session: Option<&str>) -> String {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .unwrap_or("direct");

    match session.filter(|s| !s.is_empty()) {
        Some(session) => format!("{ip}:{session}"),
        None => ip.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::InMemoryCache;
    use std::sync::Arc;

    fn limiter(max: u32, backend: &InMemoryCache) -> RateLimiter {
        RateLimiter::new(
            Cache::new(Arc::new(backend.clone())),
            max,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn allows_up_to_the_budget_then_limits() {
        let backend = InMemoryCache::new();
        let limiter = limiter(2, &backend);

        assert_eq!(limiter.check("availability", "1.2.3.4").await, RateLimitDecision::Allowed);
        assert_eq!(limiter.check("availability", "1.2.3.4").await, RateLimitDecision::Allowed);

        match limiter.check("availability", "1.2.3.4").await {
            RateLimitDecision::Limited { retry_after_secs } => {
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            RateLimitDecision::Allowed => panic!("expected limit"),
        }
    }

    #[tokio::test]
    async fn scopes_and_callers_are_independent() {
        let backend = InMemoryCache::new();
        let limiter = limiter(1, &backend);

        assert_eq!(limiter.check("availability", "a").await, RateLimitDecision::Allowed);
        assert_eq!(limiter.check("reserve", "a").await, RateLimitDecision::Allowed);
        assert_eq!(limiter.check("availability", "b").await, RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.check("availability", "a").await,
            RateLimitDecision::Limited { .. }
        ));
    }

    #[tokio::test]
    async fn fails_open_when_the_backend_is_down() {
        let backend = InMemoryCache::new();
        let limiter = limiter(1, &backend);

        assert_eq!(limiter.check("availability", "a").await, RateLimitDecision::Allowed);
        backend.set_failing(true);

        // Over budget, but the backend is down: let it through.
        for _ in 0..5 {
            assert_eq!(limiter.check("availability", "a").await, RateLimitDecision::Allowed);
        }
    }

    #[test]
    fn caller_key_prefers_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        assert_eq!(caller_key(&headers, None), "10.0.0.1");
        assert_eq!(caller_key(&headers, Some("sess-1")), "10.0.0.1:sess-1");
    }

    #[test]
    fn caller_key_without_headers_shares_the_direct_bucket() {
        let headers = HeaderMap::new();
        assert_eq!(caller_key(&headers, None), "direct");
        assert_eq!(caller_key(&headers, Some("")), "direct");
    }
}
