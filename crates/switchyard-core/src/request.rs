//! Request context and utilities

use http::{Extensions, HeaderValue, Method, Request};
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;
use uuid::Uuid;

/// Header carrying the per-request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Context attached to each request as it moves through the pipeline
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request ID for tracing
    pub request_id: String,

    /// HTTP method of the inbound request
    pub method: Method,

    /// Path of the inbound request
    pub path: String,

    /// Address of the connected peer
    pub client_addr: Option<SocketAddr>,

    /// Key the rate limiter bucketed this request under
    pub client_key: Option<String>,

    /// Route selected for this request
    pub route: Option<RouteInfo>,

    /// When the gateway started handling the request
    pub started: Instant,

    /// Values stages hand from their request hook to their response hook
    pub extensions: Extensions,
}

impl RequestContext {
    /// Create a context for an inbound request.
    ///
    /// A well-formed `X-Request-ID` supplied by the caller is kept so that
    /// ids correlate across hops; otherwise a fresh v4 UUID is assigned.
    pub fn for_request<B>(req: &Request<B>, client_addr: Option<SocketAddr>) -> Self {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty() && v.len() <= 128)
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request_id,
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            client_addr,
            client_key: None,
            route: None,
            started: Instant::now(),
            extensions: Extensions::new(),
        }
    }

    /// IP address of the connected peer
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_addr.map(|addr| addr.ip())
    }

    /// Request id as a header value
    pub fn request_id_header(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.request_id).ok()
    }
}

/// Route information recorded once the router has matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// Matched path prefix
    pub prefix: String,

    /// Backend base URL
    pub target: String,
}
