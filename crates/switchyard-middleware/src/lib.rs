//! # Switchyard Middleware
//!
//! Built-in pipeline stages:
//! - Request ID propagation
//! - Access logging
//! - Security response headers
//! - CORS (Cross-Origin Resource Sharing)
//! - Fixed-window rate limiting

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod builder;
pub mod cors;
pub mod logging;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use builder::MiddlewareBuilder;
pub use cors::{Cors, CorsConfig};
pub use logging::{LoggingConfig, RequestLogger};
pub use rate_limit::{
    ClientWindow, Decision, FixedWindowLimiter, KeyExtractor, RateLimit, RateLimitConfig,
};
pub use request_id::RequestId;
pub use security_headers::{SecurityHeaders, SecurityHeadersConfig};

// Re-export core pipeline types from switchyard-core
pub use switchyard_core::{Flow, Stage};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::builder::MiddlewareBuilder;
    pub use crate::cors::{Cors, CorsConfig};
    pub use crate::logging::{LoggingConfig, RequestLogger};
    pub use crate::rate_limit::{FixedWindowLimiter, KeyExtractor, RateLimit, RateLimitConfig};
    pub use crate::request_id::RequestId;
    pub use crate::security_headers::{SecurityHeaders, SecurityHeadersConfig};
    pub use switchyard_core::{Flow, Stage};
}
