//! Terminal request handler: route and forward

use async_trait::async_trait;
use http::{Request, Response};
use std::sync::Arc;
use switchyard_core::{Body, Handler, RequestContext, Result};
use switchyard_proxy::HttpProxy;
use switchyard_router::Router;
use tracing::debug;

/// Resolves the route for a request and forwards it to the backend
#[derive(Debug, Clone)]
pub struct GatewayHandler {
    router: Router,
    proxy: Arc<HttpProxy>,
}

impl GatewayHandler {
    /// Create a new gateway handler
    pub fn new(router: Router, proxy: Arc<HttpProxy>) -> Self {
        Self { router, proxy }
    }
}

#[async_trait]
impl Handler for GatewayHandler {
    async fn handle(&self, req: Request<Body>, ctx: &mut RequestContext) -> Result<Response<Body>> {
        let route = self.router.resolve(req.uri().path())?;
        ctx.route = Some(route.info());

        debug!(
            request_id = %ctx.request_id,
            prefix = %route.prefix,
            target = %route.target,
            "Route matched"
        );

        self.proxy.forward(req, &route, ctx.client_ip()).await
    }
}
