//! Request ID propagation for distributed tracing

use async_trait::async_trait;
use http::header::HeaderName;
use http::{Request, Response};
use switchyard_core::{Body, Flow, RequestContext, Result, Stage, REQUEST_ID_HEADER};

/// Request ID middleware
///
/// Forwards the context's request id to the backend and echoes it on the
/// response. The id itself is assigned when the context is created: the
/// caller's `X-Request-ID` if it sent a usable one, a fresh UUID otherwise.
#[derive(Debug, Clone)]
pub struct RequestId {
    header_name: HeaderName,
}

impl RequestId {
    /// Create a new Request ID middleware
    pub fn new() -> Self {
        Self {
            header_name: HeaderName::from_static(REQUEST_ID_HEADER),
        }
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for RequestId {
    fn name(&self) -> &'static str {
        "request_id"
    }

    async fn on_request(&self, mut req: Request<Body>, ctx: &mut RequestContext) -> Result<Flow> {
        if let Some(value) = ctx.request_id_header() {
            req.headers_mut().insert(self.header_name.clone(), value);
        }
        Ok(Flow::Continue(req))
    }

    fn on_response(&self, ctx: &RequestContext, response: &mut Response<Body>) {
        if let Some(value) = ctx.request_id_header() {
            response.headers_mut().insert(self.header_name.clone(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{get, run};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_request_id_generation() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(RequestId::new())];

        let response = run(&stages, get("/api/user/1")).await;

        let id = response.headers().get(REQUEST_ID_HEADER).unwrap();
        assert_eq!(id.len(), 36);
        // The handler saw the same id the caller gets back
        assert_eq!(response.headers().get("x-seen-request-id").unwrap(), id);
    }

    #[tokio::test]
    async fn test_request_id_preservation() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(RequestId::new())];

        let mut req = get("/api/user/1");
        req.headers_mut()
            .insert(REQUEST_ID_HEADER, "trace-abc".parse().unwrap());
        let response = run(&stages, req).await;

        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            "trace-abc"
        );
    }
}
