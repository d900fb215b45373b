/// Rate Limiting System
///
/// Two layers:
/// - a process-wide throttle (`governor`) applied to every request
/// - a fixed-window counter keyed by client, used on public beacons
use crate::{
    context::AppContext,
    error::{CmsError, CmsResult},
    metrics,
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{
    collections::HashMap,
    convert::Infallible,
    net::SocketAddr,
    num::NonZeroU32,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// Process-wide request throttle
#[derive(Clone)]
pub struct GlobalRateLimiter {
    limiter: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl GlobalRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(GovernorLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    pub fn check(&self) -> CmsResult<()> {
        match self.limiter.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(CmsError::RateLimitExceeded {
                retry_after: Duration::from_secs(1),
            }),
        }
    }
}

/// Counter state for one client key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
    pub window: Duration,
}

impl RateLimitEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window
    }
}

/// Fixed-window per-key limiter
///
/// The map is only touched under its mutex, so read-increment-compare is
/// atomic per call. Memory is bounded by `sweep`, which the job scheduler
/// runs on its own interval.
#[derive(Debug, Default)]
pub struct WindowRateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl WindowRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request for `key`; returns `true` when it is over the limit
    pub fn check_and_increment(&self, key: &str, max_requests: u32, window: Duration) -> bool {
        self.check_and_increment_at(key, max_requests, window, Instant::now())
    }

    pub fn check_and_increment_at(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
        now: Instant,
    ) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.count = entry.count.saturating_add(1);
                entry.count > max_requests
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    RateLimitEntry {
                        count: 1,
                        window_start: now,
                        window,
                    },
                );
                max_requests == 0
            }
        }
    }

    /// Drop entries whose window has passed; returns how many were removed
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Client identifier derived from request metadata
///
/// The peer address, unless proxy headers are trusted, in which case the
/// first hop of `X-Forwarded-For` or else `X-Real-IP` wins when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl ClientKey {
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> Self {
        let peer_key = || peer.map(|addr| addr.ip().to_string());

        if !trust_proxy {
            return ClientKey(peer_key().unwrap_or_else(|| "unknown".to_string()));
        }

        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let key = forwarded
            .or(real_ip)
            .map(String::from)
            .or_else(peer_key)
            .unwrap_or_else(|| "unknown".to_string());

        ClientKey(key)
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for ClientKey {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientKey::from_parts(
            &parts.headers,
            peer,
            state.config.rate_limit.trust_proxy_headers,
        ))
    }
}

/// Global rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, CmsError> {
    if !ctx.config.rate_limit.enabled {
        return Ok(next.run(request).await);
    }

    if let Err(e) = ctx.global_rate_limiter.check() {
        metrics::record_rate_limited("global");
        tracing::warn!(path = %request.uri().path(), "Global rate limit exceeded");
        return Err(e);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_window_limit_and_reset() {
        let limiter = WindowRateLimiter::new();
        let window = Duration::from_millis(1000);
        let start = Instant::now();

        assert!(!limiter.check_and_increment_at("k", 3, window, start));
        assert!(!limiter.check_and_increment_at("k", 3, window, start + Duration::from_millis(100)));
        assert!(!limiter.check_and_increment_at("k", 3, window, start + Duration::from_millis(900)));
        assert!(limiter.check_and_increment_at("k", 3, window, start + Duration::from_millis(999)));

        // Window elapsed: counting starts over
        assert!(!limiter.check_and_increment_at("k", 3, window, start + Duration::from_millis(1001)));
    }

    #[test]
    fn test_window_limit_real_clock() {
        let limiter = WindowRateLimiter::new();
        let window = Duration::from_millis(50);

        for _ in 0..3 {
            assert!(!limiter.check_and_increment("client", 3, window));
        }
        assert!(limiter.check_and_increment("client", 3, window));

        std::thread::sleep(Duration::from_millis(80));
        assert!(!limiter.check_and_increment("client", 3, window));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = WindowRateLimiter::new();
        let window = Duration::from_secs(60);
        let now = Instant::now();

        assert!(!limiter.check_and_increment_at("a", 1, window, now));
        assert!(limiter.check_and_increment_at("a", 1, window, now));
        assert!(!limiter.check_and_increment_at("b", 1, window, now));
    }

    #[test]
    fn test_sweep_removes_only_stale_entries() {
        let limiter = WindowRateLimiter::new();
        let now = Instant::now();

        limiter.check_and_increment_at("old", 5, Duration::from_secs(1), now);
        limiter.check_and_increment_at("fresh", 5, Duration::from_secs(600), now);
        assert_eq!(limiter.len(), 2);

        assert_eq!(limiter.sweep_at(now + Duration::from_secs(2)), 1);
        assert_eq!(limiter.len(), 1);
        assert!(!limiter.is_empty());

        // The surviving key still has its count
        assert!(!limiter.check_and_increment_at("fresh", 2, Duration::from_secs(600), now));
        assert!(limiter.check_and_increment_at("fresh", 2, Duration::from_secs(600), now));
    }

    #[test]
    fn test_concurrent_increments_are_counted() {
        let limiter = Arc::new(WindowRateLimiter::new());
        let window = Duration::from_secs(60);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| !limiter.check_and_increment("shared", 100, window))
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 100);
    }

    #[test]
    fn test_global_limiter_burst() {
        let limiter = GlobalRateLimiter::new(5);
        for _ in 0..5 {
            assert!(limiter.check().is_ok());
        }
        assert!(matches!(
            limiter.check(),
            Err(CmsError::RateLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_client_key_from_trusted_proxy() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.0.0.9:5123".parse().unwrap();

        assert_eq!(ClientKey::from_parts(&headers, Some(peer), true).0, "10.0.0.9");
        assert_eq!(ClientKey::from_parts(&headers, None, true).0, "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.4"));
        assert_eq!(ClientKey::from_parts(&headers, Some(peer), true).0, "192.168.1.4");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(ClientKey::from_parts(&headers, Some(peer), true).0, "203.0.113.7");
    }

    #[test]
    fn test_client_key_ignores_untrusted_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.4"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        let peer: SocketAddr = "10.0.0.9:5123".parse().unwrap();

        assert_eq!(ClientKey::from_parts(&headers, Some(peer), false).0, "10.0.0.9");
        assert_eq!(ClientKey::from_parts(&headers, None, false).0, "unknown");
    }
}
