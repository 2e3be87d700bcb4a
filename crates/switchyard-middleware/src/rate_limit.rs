//! Rate limiting middleware using a fixed window per client

use async_trait::async_trait;
use dashmap::DashMap;
use http::{HeaderName, HeaderValue, Request, Response};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_core::error::retry_after_secs;
use switchyard_core::{Body, Error, Flow, RequestContext, Result, Stage};

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Key extraction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyExtractor {
    /// Extract key from the peer IP address
    #[default]
    Ip,
    /// Extract key from a header (e.g., API key), falling back to the peer IP
    Header,
    /// Global rate limit (one shared bucket)
    Global,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
    /// Key extraction strategy
    pub key_extractor: KeyExtractor,
    /// Header name for key extraction (if using Header strategy)
    pub header_name: Option<String>,
    /// Windows idle for this many window lengths are evicted
    pub eviction_factor: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
            key_extractor: KeyExtractor::Ip,
            header_name: None,
            eviction_factor: 4,
        }
    }
}

/// Request count of one client inside its current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientWindow {
    /// When the window opened
    pub start: Instant,
    /// Requests seen in the window, rejected ones included
    pub count: u32,
}

/// Outcome of [`FixedWindowLimiter::admit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request admitted
    Allowed {
        /// Requests still admitted in this window
        remaining: u32,
        /// Time until the window resets
        reset_after: Duration,
    },
    /// Quota exhausted
    Rejected {
        /// Time until the window resets
        retry_after: Duration,
    },
}

/// Fixed-window request counter keyed by client.
///
/// `admit` holds the key's shard lock for the read-modify-write, so decisions
/// for one key are linearized while different keys proceed independently.
pub struct FixedWindowLimiter {
    windows: DashMap<String, ClientWindow>,
    max_requests: u32,
    window: Duration,
    eviction_factor: u32,
}

impl FixedWindowLimiter {
    /// Create a limiter admitting `max_requests` per `window`
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
            eviction_factor: 4,
        }
    }

    /// Create a limiter from configuration
    pub fn with_config(config: &RateLimitConfig) -> Self {
        Self {
            eviction_factor: config.eviction_factor.max(1),
            ..Self::new(config.max_requests, config.window)
        }
    }

    /// Count a request from `key` at `now` and decide whether to admit it.
    ///
    /// A new window opens when the key has none or the current one has run
    /// its full length. `max_requests == 0` rejects everything; a zero window
    /// opens a fresh window on every call.
    pub fn admit(&self, key: &str, now: Instant) -> Decision {
        if let Some(mut window) = self.windows.get_mut(key) {
            return self.count(&mut window, now);
        }

        let mut window = self
            .windows
            .entry(key.to_owned())
            .or_insert(ClientWindow {
                start: now,
                count: 0,
            });
        self.count(&mut window, now)
    }

    fn count(&self, window: &mut ClientWindow, now: Instant) -> Decision {
        if window.count == 0 || now.saturating_duration_since(window.start) >= self.window {
            window.start = now;
            window.count = 0;
        }

        window.count = window.count.saturating_add(1);
        let reset_after = (window.start + self.window).saturating_duration_since(now);

        if window.count > self.max_requests {
            Decision::Rejected {
                retry_after: reset_after,
            }
        } else {
            Decision::Allowed {
                remaining: self.max_requests - window.count,
                reset_after,
            }
        }
    }

    /// Drop windows that opened more than `eviction_factor` windows ago.
    ///
    /// Such windows have already expired, so the next request from the key
    /// would open a new one anyway. Returns the number evicted.
    pub fn evict_stale(&self, now: Instant) -> usize {
        let ttl = self.window.saturating_mul(self.eviction_factor);
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.saturating_duration_since(window.start) < ttl);
        before.saturating_sub(self.windows.len())
    }

    /// Current window of a key
    pub fn window_of(&self, key: &str) -> Option<ClientWindow> {
        self.windows.get(key).map(|w| *w)
    }

    /// Number of tracked clients
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no client is tracked
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Maximum requests per window
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("clients", &self.windows.len())
            .finish()
    }
}

/// Quota snapshot carried from the request hook to the response hook
#[derive(Debug, Clone, Copy)]
struct Quota {
    limit: u32,
    remaining: u32,
    reset_after: Duration,
}

/// Rate limiting stage
///
/// Buckets requests by client key and rejects with `429` once the client's
/// window is exhausted. Every response that passed through carries
/// `RateLimit-Limit`, `RateLimit-Remaining` and `RateLimit-Reset`.
#[derive(Clone)]
pub struct RateLimit {
    config: RateLimitConfig,
    header_name: Option<HeaderName>,
    limiter: Arc<FixedWindowLimiter>,
}

impl RateLimit {
    /// Create a new RateLimit stage with default config
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a new RateLimit stage with custom config
    pub fn with_config(config: RateLimitConfig) -> Self {
        let limiter = Arc::new(FixedWindowLimiter::with_config(&config));
        Self::with_limiter(config, limiter)
    }

    /// Create a stage around an existing limiter (shared with a sweeper)
    pub fn with_limiter(config: RateLimitConfig, limiter: Arc<FixedWindowLimiter>) -> Self {
        let header_name = config
            .header_name
            .as_deref()
            .and_then(|name| HeaderName::from_bytes(name.as_bytes()).ok());

        Self {
            config,
            header_name,
            limiter,
        }
    }

    /// Shared limiter
    pub fn limiter(&self) -> &Arc<FixedWindowLimiter> {
        &self.limiter
    }

    /// Bucket key for a request
    pub fn client_key<B>(&self, req: &Request<B>, ctx: &RequestContext) -> String {
        let by_ip = || {
            ctx.client_ip()
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };

        match self.config.key_extractor {
            KeyExtractor::Ip => by_ip(),
            KeyExtractor::Global => "global".to_string(),
            KeyExtractor::Header => self
                .header_name
                .as_ref()
                .and_then(|name| req.headers().get(name))
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(|v| format!("key:{v}"))
                .unwrap_or_else(by_ip),
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimit")
            .field("max_requests", &self.config.max_requests)
            .field("window", &self.config.window)
            .field("key_extractor", &self.config.key_extractor)
            .finish()
    }
}

#[async_trait]
impl Stage for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn on_request(&self, req: Request<Body>, ctx: &mut RequestContext) -> Result<Flow> {
        let key = self.client_key(&req, ctx);
        let decision = self.limiter.admit(&key, Instant::now());
        ctx.client_key = Some(key);

        match decision {
            Decision::Allowed {
                remaining,
                reset_after,
            } => {
                ctx.extensions.insert(Quota {
                    limit: self.config.max_requests,
                    remaining,
                    reset_after,
                });
                Ok(Flow::Continue(req))
            }
            Decision::Rejected { retry_after } => {
                tracing::debug!(
                    client = ctx.client_key.as_deref(),
                    path = %ctx.path,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limit exceeded"
                );
                ctx.extensions.insert(Quota {
                    limit: self.config.max_requests,
                    remaining: 0,
                    reset_after: retry_after,
                });
                Err(Error::RateLimited { retry_after })
            }
        }
    }

    fn on_response(&self, ctx: &RequestContext, response: &mut Response<Body>) {
        let Some(quota) = ctx.extensions.get::<Quota>() else {
            return;
        };

        let headers = response.headers_mut();
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
        headers.insert(
            RATELIMIT_RESET,
            HeaderValue::from(retry_after_secs(quota.reset_after)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{get, run};
    use http::{header, StatusCode};
    use std::net::SocketAddr;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_fixed_window_admits_then_rejects() {
        let limiter = FixedWindowLimiter::new(2, MINUTE);
        let t0 = Instant::now();

        assert_eq!(
            limiter.admit("a", t0),
            Decision::Allowed {
                remaining: 1,
                reset_after: MINUTE
            }
        );
        assert!(matches!(
            limiter.admit("a", t0 + Duration::from_secs(1)),
            Decision::Allowed { remaining: 0, .. }
        ));
        assert_eq!(
            limiter.admit("a", t0 + Duration::from_secs(20)),
            Decision::Rejected {
                retry_after: Duration::from_secs(40)
            }
        );

        // Window boundary is inclusive
        assert!(matches!(
            limiter.admit("a", t0 + MINUTE),
            Decision::Allowed { remaining: 1, .. }
        ));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = FixedWindowLimiter::new(1, MINUTE);
        let t0 = Instant::now();

        assert!(matches!(limiter.admit("a", t0), Decision::Allowed { .. }));
        assert!(matches!(limiter.admit("a", t0), Decision::Rejected { .. }));
        assert!(matches!(limiter.admit("b", t0), Decision::Allowed { .. }));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_zero_max_rejects_everything() {
        let limiter = FixedWindowLimiter::new(0, MINUTE);
        let t0 = Instant::now();

        assert_eq!(
            limiter.admit("a", t0),
            Decision::Rejected {
                retry_after: MINUTE
            }
        );
    }

    #[test]
    fn test_zero_window_is_unlimited() {
        let limiter = FixedWindowLimiter::new(1, Duration::ZERO);
        let t0 = Instant::now();

        for _ in 0..10 {
            assert!(matches!(limiter.admit("a", t0), Decision::Allowed { .. }));
        }
    }

    #[test]
    fn test_evict_stale() {
        let config = RateLimitConfig {
            max_requests: 5,
            window: MINUTE,
            eviction_factor: 2,
            ..Default::default()
        };
        let limiter = FixedWindowLimiter::with_config(&config);
        let t0 = Instant::now();

        limiter.admit("old", t0);
        limiter.admit("fresh", t0 + Duration::from_secs(90));

        assert_eq!(limiter.evict_stale(t0 + Duration::from_secs(100)), 0);
        assert_eq!(limiter.evict_stale(t0 + Duration::from_secs(120)), 1);
        assert!(limiter.window_of("old").is_none());
        assert_eq!(limiter.window_of("fresh").unwrap().count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admits_are_exact() {
        let limiter = Arc::new(FixedWindowLimiter::new(500, MINUTE));

        let tasks: Vec<_> = (0..1000)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.admit("shared", Instant::now()) })
            })
            .collect();

        let mut allowed = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Decision::Allowed { .. } => allowed += 1,
                Decision::Rejected { .. } => rejected += 1,
            }
        }

        assert_eq!(allowed, 500);
        assert_eq!(rejected, 500);
    }

    #[test]
    fn test_client_key_extraction() {
        let peer: SocketAddr = "10.1.2.3:5000".parse().unwrap();
        let with_key = Request::builder()
            .uri("/api/user")
            .header("x-api-key", "tenant-7")
            .body(())
            .unwrap();
        let without_key = Request::builder().uri("/api/user").body(()).unwrap();
        let ctx = RequestContext::for_request(&with_key, Some(peer));

        let by_ip = RateLimit::new();
        assert_eq!(by_ip.client_key(&with_key, &ctx), "10.1.2.3");

        let by_header = RateLimit::with_config(RateLimitConfig {
            key_extractor: KeyExtractor::Header,
            header_name: Some("X-Api-Key".to_string()),
            ..Default::default()
        });
        assert_eq!(by_header.client_key(&with_key, &ctx), "key:tenant-7");
        assert_eq!(by_header.client_key(&without_key, &ctx), "10.1.2.3");

        let global = RateLimit::with_config(RateLimitConfig {
            key_extractor: KeyExtractor::Global,
            ..Default::default()
        });
        assert_eq!(global.client_key(&with_key, &ctx), "global");
    }

    #[tokio::test]
    async fn test_stage_sets_headers_and_rejects() {
        let stage = RateLimit::with_config(RateLimitConfig {
            max_requests: 2,
            window: MINUTE,
            ..Default::default()
        });
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(stage)];

        let first = run(&stages, get("/api/wallet")).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers().get("ratelimit-limit").unwrap(), "2");
        assert_eq!(first.headers().get("ratelimit-remaining").unwrap(), "1");
        assert_eq!(first.headers().get("ratelimit-reset").unwrap(), "60");

        let second = run(&stages, get("/api/wallet")).await;
        assert_eq!(second.headers().get("ratelimit-remaining").unwrap(), "0");

        let third = run(&stages, get("/api/wallet")).await;
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(third.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(third.headers().get("ratelimit-remaining").unwrap(), "0");
    }
}
