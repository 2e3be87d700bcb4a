//! Access logging middleware

use async_trait::async_trait;
use http::{HeaderMap, Request, Response, Uri};
use std::fmt;
use switchyard_core::{Body, Flow, RequestContext, Result, Stage};
use tracing::Level;

/// Emit an event at a level chosen at runtime
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::TRACE => tracing::trace!($($arg)+),
            Level::DEBUG => tracing::debug!($($arg)+),
            Level::INFO => tracing::info!($($arg)+),
            Level::WARN => tracing::warn!($($arg)+),
            _ => tracing::error!($($arg)+),
        }
    };
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level of the access-log record
    pub log_level: Level,
    /// Whether to log request headers
    pub log_headers: bool,
    /// Headers to redact (e.g., Authorization, Cookie)
    pub sensitive_headers: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            log_headers: false,
            sensitive_headers: vec![
                "authorization".to_string(),
                "cookie".to_string(),
                "set-cookie".to_string(),
                "x-api-key".to_string(),
                "proxy-authorization".to_string(),
            ],
        }
    }
}

/// Full request URI, kept for the access-log record
#[derive(Debug, Clone)]
struct LoggedUri(Uri);

/// Access logging middleware
///
/// Emits one record per request once the response is known, whether it came
/// from a backend, a short-circuiting stage or the error responder.
#[derive(Clone)]
pub struct RequestLogger {
    config: LoggingConfig,
}

impl RequestLogger {
    /// Create a new RequestLogger with default config
    pub fn new() -> Self {
        Self::with_config(LoggingConfig::default())
    }

    /// Create a new RequestLogger with custom config
    pub fn with_config(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Check if a header should be redacted
    fn should_redact(&self, header_name: &str) -> bool {
        self.config
            .sensitive_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(header_name))
    }

    /// Redact a header value
    fn redact_value(&self, header_name: &str, value: &str) -> String {
        if self.should_redact(header_name) {
            "[REDACTED]".to_string()
        } else {
            value.to_string()
        }
    }

    fn describe_headers(&self, headers: &HeaderMap) -> Vec<String> {
        headers
            .iter()
            .map(|(name, value)| {
                let value_str = value.to_str().unwrap_or("[invalid UTF-8]");
                format!("{}: {}", name, self.redact_value(name.as_str(), value_str))
            })
            .collect()
    }
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger")
            .field("log_level", &self.config.log_level)
            .field("log_headers", &self.config.log_headers)
            .finish()
    }
}

#[async_trait]
impl Stage for RequestLogger {
    fn name(&self) -> &'static str {
        "request_logger"
    }

    async fn on_request(&self, req: Request<Body>, ctx: &mut RequestContext) -> Result<Flow> {
        if self.config.log_headers {
            tracing::debug!(
                request_id = %ctx.request_id,
                method = %req.method(),
                uri = %req.uri(),
                version = ?req.version(),
                headers = ?self.describe_headers(req.headers()),
                "Incoming request"
            );
        }

        ctx.extensions.insert(LoggedUri(req.uri().clone()));
        Ok(Flow::Continue(req))
    }

    fn on_response(&self, ctx: &RequestContext, response: &mut Response<Body>) {
        let uri = ctx
            .extensions
            .get::<LoggedUri>()
            .map(|u| u.0.to_string())
            .unwrap_or_else(|| ctx.path.clone());
        let client = ctx.client_ip().map(|ip| ip.to_string());
        let target = ctx.route.as_ref().map(|r| r.target.as_str());
        let duration_ms = ctx.started.elapsed().as_millis() as u64;

        log_at!(
            self.config.log_level,
            request_id = %ctx.request_id,
            method = %ctx.method,
            uri = %uri,
            status = response.status().as_u16(),
            duration_ms,
            client = client.as_deref(),
            target,
            "Request completed"
        );
    }
}
