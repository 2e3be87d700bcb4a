//! Configuration types

use http::Method;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use switchyard_core::{Error, Result};
use switchyard_middleware::{CorsConfig, KeyExtractor, RateLimitConfig};
use switchyard_router::{Route, RouteBuilder};

pub use switchyard_middleware::SecurityHeadersConfig;

/// Default wallet backend
pub const DEFAULT_WALLET_SERVICE_URL: &str = "http://localhost:5201";

/// Default user backend
pub const DEFAULT_USER_SERVICE_URL: &str = "http://localhost:5202";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// CORS policy
    #[serde(default)]
    pub cors: CorsSettings,

    /// Security response headers
    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,

    /// Backend client settings
    #[serde(default)]
    pub proxy: ProxySettings,

    /// Routes. When empty the wallet and user defaults are used.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    /// Observability
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Configured routes, or the built-in defaults when none are configured
    pub fn effective_routes(&self) -> Vec<RouteConfig> {
        if self.routes.is_empty() {
            default_routes()
        } else {
            self.routes.clone()
        }
    }

    /// Build the router's route list
    pub fn build_routes(&self) -> Result<Vec<Route>> {
        self.effective_routes()
            .iter()
            .map(RouteConfig::to_route)
            .collect()
    }
}

/// Deployment mode
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Error responses carry detail
    Development,
    /// Error responses carry only the reason phrase
    #[default]
    Production,
}

impl Mode {
    /// Whether error detail is shown to callers
    pub fn is_development(self) -> bool {
        self == Mode::Development
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" => Ok(Mode::Development),
            "production" => Ok(Mode::Production),
            other => Err(Error::Config(format!(
                "unknown mode '{other}' (expected development or production)"
            ))),
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Time allowed for a backend to send response headers
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Graceful shutdown timeout (wait for in-flight requests)
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Deployment mode
    #[serde(default)]
    pub mode: Mode,

    /// Liveness check path
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            request_timeout: default_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            mode: Mode::default(),
            health_path: default_health_path(),
        }
    }
}

/// Client key strategy for rate limiting
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyStrategy {
    /// Peer IP address
    #[default]
    Ip,
    /// Request header, falling back to the peer IP
    Header,
    /// One bucket for everyone
    Global,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitSettings {
    /// Whether the rate limit stage is installed
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Window length
    #[serde(default = "default_rate_limit_window", with = "humantime_serde")]
    pub window: Duration,

    /// Requests admitted per client per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// How clients are told apart
    #[serde(default)]
    pub key: KeyStrategy,

    /// Header holding the client key when `key` is `header`
    #[serde(default)]
    pub header: Option<String>,

    /// Windows are evicted after this many window lengths
    #[serde(default = "default_eviction_factor")]
    pub eviction_factor: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_rate_limit_window(),
            max_requests: default_max_requests(),
            key: KeyStrategy::default(),
            header: None,
            eviction_factor: default_eviction_factor(),
        }
    }
}

impl RateLimitSettings {
    /// Rate limit stage configuration
    pub fn to_middleware(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.max_requests,
            window: self.window,
            key_extractor: match self.key {
                KeyStrategy::Ip => KeyExtractor::Ip,
                KeyStrategy::Header => KeyExtractor::Header,
                KeyStrategy::Global => KeyExtractor::Global,
            },
            header_name: self.header.clone(),
            eviction_factor: self.eviction_factor,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorsSettings {
    /// Whether the CORS stage is installed
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Allowed origins, `*` for any
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Allowed methods
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,

    /// Allowed request headers
    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,

    /// Headers exposed to browsers
    #[serde(default = "default_exposed_headers")]
    pub exposed_headers: Vec<String>,

    /// Preflight cache lifetime
    #[serde(default = "default_cors_max_age", with = "humantime_serde")]
    pub max_age: Duration,

    /// Whether credentials are allowed
    #[serde(default)]
    pub allow_credentials: bool,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: default_allowed_origins(),
            allowed_methods: default_allowed_methods(),
            allowed_headers: default_allowed_headers(),
            exposed_headers: default_exposed_headers(),
            max_age: default_cors_max_age(),
            allow_credentials: false,
        }
    }
}

impl CorsSettings {
    /// CORS stage configuration
    pub fn to_middleware(&self) -> Result<CorsConfig> {
        let allowed_methods = self
            .allowed_methods
            .iter()
            .map(|m| {
                m.to_ascii_uppercase()
                    .parse::<Method>()
                    .map_err(|e| Error::Config(format!("invalid CORS method '{m}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CorsConfig {
            allowed_origins: self.allowed_origins.clone(),
            allowed_methods,
            allowed_headers: self.allowed_headers.clone(),
            exposed_headers: self.exposed_headers.clone(),
            max_age: self.max_age,
            allow_credentials: self.allow_credentials,
        })
    }
}

/// Backend client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxySettings {
    /// TCP connect timeout
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Idle pooled connections are closed after this long
    #[serde(default = "default_pool_idle_timeout", with = "humantime_serde")]
    pub pool_idle_timeout: Duration,

    /// Idle pooled connections kept per backend host
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Keep the caller's Host header instead of the backend's
    #[serde(default)]
    pub preserve_host: bool,

    /// Add X-Forwarded-For/Proto/Host
    #[serde(default = "default_true")]
    pub forwarded_headers: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            pool_idle_timeout: default_pool_idle_timeout(),
            pool_max_idle_per_host: default_pool_max_idle(),
            preserve_host: false,
            forwarded_headers: true,
        }
    }
}

/// Route configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Path prefix
    #[serde(alias = "path")]
    pub prefix: String,

    /// Backend base URL
    pub target: String,

    /// Replacement for the matched prefix; unset keeps the path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<String>,
}

impl RouteConfig {
    /// Create a route that preserves the path
    pub fn new(prefix: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            target: target.into(),
            rewrite: None,
        }
    }

    /// Build the router route
    pub fn to_route(&self) -> Result<Route> {
        let mut builder = RouteBuilder::new()
            .prefix(self.prefix.as_str())
            .target(self.target.as_str());
        if let Some(rewrite) = &self.rewrite {
            builder = builder.rewrite(rewrite.as_str());
        }
        builder.build()
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, text)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Emit one access-log record per request
    #[serde(default = "default_true")]
    pub access_log: bool,

    /// Level of the access-log record (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub access_log_level: String,

    /// Include (redacted) request headers in debug logs
    #[serde(default)]
    pub log_headers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            access_log: true,
            access_log_level: default_log_level(),
            log_headers: false,
        }
    }
}

/// Built-in routes for the wallet and user backends
pub fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::new("/api/wallet", DEFAULT_WALLET_SERVICE_URL),
        RouteConfig::new("/api/user", DEFAULT_USER_SERVICE_URL),
    ]
}

fn default_true() -> bool {
    true
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_health_path() -> String {
    "/ping".to_string()
}

fn default_rate_limit_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_max_requests() -> u32 {
    100
}

fn default_eviction_factor() -> u32 {
    4
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_allowed_methods() -> Vec<String> {
    ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_allowed_headers() -> Vec<String> {
    CorsConfig::default().allowed_headers
}

fn default_exposed_headers() -> Vec<String> {
    CorsConfig::default().exposed_headers
}

fn default_cors_max_age() -> Duration {
    Duration::from_secs(3600)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_pool_idle_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_pool_max_idle() -> usize {
    32
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.gateway.listen.port(), 8080);
        assert_eq!(config.gateway.mode, Mode::Production);
        assert_eq!(config.gateway.health_path, "/ping");
        assert_eq!(config.rate_limit.window, Duration::from_secs(900));
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.observability.logging.format, "text");
    }

    #[test]
    fn test_default_routes_apply_when_none_configured() {
        let config = Config::default();
        let routes = config.build_routes().unwrap();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].prefix, "/api/wallet");
        assert_eq!(routes[0].target.port(), Some(5201));
        assert_eq!(routes[1].prefix, "/api/user");
    }

    #[test]
    fn test_configured_routes_replace_defaults() {
        let config = Config {
            routes: vec![RouteConfig::new("/api/customer", "http://localhost:5203")],
            ..Default::default()
        };

        let routes = config.build_routes().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].prefix, "/api/customer");
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("development".parse::<Mode>().unwrap(), Mode::Development);
        assert_eq!("PRODUCTION".parse::<Mode>().unwrap(), Mode::Production);
        assert!("staging".parse::<Mode>().is_err());
    }

    #[test]
    fn test_cors_settings_to_middleware() {
        let settings = CorsSettings {
            allowed_methods: vec!["get".to_string(), "POST".to_string()],
            ..Default::default()
        };

        let cors = settings.to_middleware().unwrap();
        assert_eq!(cors.allowed_methods, vec![Method::GET, Method::POST]);

        let bad = CorsSettings {
            allowed_methods: vec!["GE T".to_string()],
            ..Default::default()
        };
        assert!(bad.to_middleware().is_err());
    }

    #[test]
    fn test_rate_limit_settings_to_middleware() {
        let settings = RateLimitSettings {
            key: KeyStrategy::Header,
            header: Some("x-api-key".to_string()),
            ..Default::default()
        };

        let config = settings.to_middleware();
        assert_eq!(config.key_extractor, KeyExtractor::Header);
        assert_eq!(config.header_name.as_deref(), Some("x-api-key"));
        assert_eq!(config.max_requests, 100);
    }
}
