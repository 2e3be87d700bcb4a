//! Response builder and error-to-response mapping

use crate::body::{self, Body};
use crate::error::retry_after_secs;
use crate::{Error, RequestContext, Result};
use http::{header, HeaderValue, Response, StatusCode};
use serde::{Deserialize, Serialize};

/// Response builder for convenient response construction
#[derive(Debug)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Vec<(header::HeaderName, String)>,
}

impl ResponseBuilder {
    /// Create a new response builder
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    /// Set a header
    pub fn header(mut self, name: header::HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Build response with empty body
    pub fn build(self) -> Result<Response<Body>> {
        let mut response = Response::builder().status(self.status);

        for (name, value) in self.headers {
            response = response.header(name, value);
        }

        Ok(response.body(body::empty())?)
    }

    /// Build response with text body
    pub fn text(self, content: impl Into<String>) -> Result<Response<Body>> {
        let mut response = Response::builder().status(self.status);

        response = response.header(header::CONTENT_TYPE, "text/plain; charset=utf-8");

        for (name, value) in self.headers {
            response = response.header(name, value);
        }

        Ok(response.body(body::full(content.into()))?)
    }
}

/// JSON body of every gateway-originated error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Short, stable error label (the HTTP reason phrase)
    pub error: String,

    /// Error detail, only present in development mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Turns pipeline errors into HTTP responses.
///
/// Every error is logged with its full detail; the caller only ever sees the
/// reason phrase unless `expose_details` is set (development mode).
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorResponder {
    expose_details: bool,
}

impl ErrorResponder {
    /// Create a responder
    pub fn new(expose_details: bool) -> Self {
        Self { expose_details }
    }

    /// Whether error detail is included in response bodies
    pub fn exposes_details(&self) -> bool {
        self.expose_details
    }

    /// Log the error and build the response for it
    pub fn respond(&self, err: &Error, ctx: &RequestContext) -> Response<Body> {
        let status = err.to_status_code();
        let target = ctx.route.as_ref().map(|r| r.target.as_str());

        if status.is_server_error() {
            tracing::error!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                path = %ctx.path,
                client = ctx.client_key.as_deref(),
                target,
                status = status.as_u16(),
                error = %err,
                "Request failed"
            );
        } else {
            tracing::warn!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                path = %ctx.path,
                client = ctx.client_key.as_deref(),
                target,
                status = status.as_u16(),
                error = %err,
                "Request rejected"
            );
        }

        let envelope = ErrorEnvelope {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.expose_details.then(|| err.to_string()),
        };

        // The envelope holds two plain strings; serialization cannot fail.
        let json = serde_json::to_vec(&envelope).unwrap_or_default();

        let mut response = Response::new(body::full(json));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        if let Some(retry_after) = err.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, retry_after_secs(retry_after).into());
        }

        response
    }
}
