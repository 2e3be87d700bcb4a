//! # Switchyard HTTP Proxy
//!
//! Forwards requests to backend services:
//! - Streaming request and response bodies
//! - Hop-by-hop header removal in both directions
//! - Host rewrite and X-Forwarded-* headers
//! - Connect and response-header timeouts

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod client;
pub mod proxy;

pub use client::{ClientConfig, HttpClient};
pub use proxy::{build_upstream_uri, strip_hop_by_hop, HttpProxy, ProxyConfig};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{ClientConfig, HttpClient};
    pub use crate::proxy::{HttpProxy, ProxyConfig};
}
