//! # Switchyard Core
//!
//! Core types, traits, and error handling for the Switchyard gateway.
//!
//! This crate provides the foundational abstractions used throughout the gateway:
//! - The streaming [`Body`] type shared by inbound and outbound messages
//! - The [`Stage`] / [`Handler`] pipeline traits
//! - Error types and the error-to-response mapping
//! - Per-request context

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod body;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod response;

pub use body::Body;
pub use error::{Error, Result};
pub use pipeline::{Flow, Handler, Pipeline, Stage};
pub use request::{RequestContext, RouteInfo, REQUEST_ID_HEADER};
pub use response::{ErrorEnvelope, ErrorResponder, ResponseBuilder};

// Re-export commonly used HTTP types
pub use bytes::Bytes;
pub use http::{Method, Request, Response, StatusCode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::body::{self, Body};
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::{Flow, Handler, Pipeline, Stage};
    pub use crate::request::{RequestContext, RouteInfo};
    pub use crate::response::{ErrorResponder, ResponseBuilder};
}
