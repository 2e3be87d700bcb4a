//! Liveness endpoint

use async_trait::async_trait;
use http::{Method, Request, StatusCode};
use switchyard_core::{Body, Flow, RequestContext, ResponseBuilder, Result, Stage};

/// Answers the health path with `200 pong`.
///
/// Sits in front of the rate limiter and the router, so neither backend
/// health nor a client's exhausted quota can fail the check.
#[derive(Debug, Clone)]
pub struct Health {
    path: String,
}

impl Health {
    /// Create a health stage for `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new("/ping")
    }
}

#[async_trait]
impl Stage for Health {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn on_request(&self, req: Request<Body>, _ctx: &mut RequestContext) -> Result<Flow> {
        let is_health_check = matches!(*req.method(), Method::GET | Method::HEAD)
            && req.uri().path() == self.path;

        if !is_health_check {
            return Ok(Flow::Continue(req));
        }

        let response = ResponseBuilder::new(StatusCode::OK).text("pong")?;
        Ok(Flow::Respond(response))
    }
}
