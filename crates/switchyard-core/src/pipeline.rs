//! Request pipeline: ordered stages in front of a terminal handler

use crate::body::Body;
use crate::{Error, ErrorResponder, RequestContext, Result};
use async_trait::async_trait;
use futures::FutureExt;
use http::{Request, Response};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Outcome of a stage's request hook
#[derive(Debug)]
pub enum Flow {
    /// Hand the request to the next stage
    Continue(Request<Body>),
    /// Stop here and answer with this response
    Respond(Response<Body>),
}

/// A single step of the request pipeline.
///
/// `on_request` runs in pipeline order and may short-circuit with
/// [`Flow::Respond`] or an error. `on_response` runs in reverse order for
/// every stage whose `on_request` was entered, whatever the outcome, so
/// response decoration also applies to rejected and failed requests.
#[async_trait]
pub trait Stage: Send + Sync + fmt::Debug {
    /// Stage name for logs
    fn name(&self) -> &'static str;

    /// Inspect or short-circuit the request
    async fn on_request(&self, req: Request<Body>, _ctx: &mut RequestContext) -> Result<Flow> {
        Ok(Flow::Continue(req))
    }

    /// Decorate the outgoing response
    fn on_response(&self, _ctx: &RequestContext, _response: &mut Response<Body>) {}
}

/// Terminal handler invoked once every stage has continued
#[async_trait]
pub trait Handler: Send + Sync + fmt::Debug {
    /// Produce the response for a request
    async fn handle(&self, req: Request<Body>, ctx: &mut RequestContext) -> Result<Response<Body>>;
}

/// Ordered, explicit composition of stages and a terminal handler
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
    handler: Arc<dyn Handler>,
    responder: ErrorResponder,
}

impl Pipeline {
    /// Create a new pipeline
    pub fn new(
        stages: Arc<[Arc<dyn Stage>]>,
        handler: Arc<dyn Handler>,
        responder: ErrorResponder,
    ) -> Self {
        Self {
            stages,
            handler,
            responder,
        }
    }

    /// Number of stages in front of the handler
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run a request through the pipeline.
    ///
    /// Never fails: errors and panics from any stage hook or the handler
    /// become responses through the [`ErrorResponder`].
    pub async fn run(&self, req: Request<Body>, mut ctx: RequestContext) -> Response<Body> {
        let mut entered = 0;
        let mut req = req;

        let outcome = loop {
            match self.stages.get(entered) {
                Some(stage) => {
                    entered += 1;
                    match guarded(stage.on_request(req, &mut ctx)).await {
                        Ok(Flow::Continue(next)) => req = next,
                        Ok(Flow::Respond(response)) => {
                            tracing::debug!(
                                request_id = %ctx.request_id,
                                stage = stage.name(),
                                status = response.status().as_u16(),
                                "Stage answered request"
                            );
                            break Ok(response);
                        }
                        Err(e) => break Err(e),
                    }
                }
                None => break guarded(self.handler.handle(req, &mut ctx)).await,
            }
        };

        let mut response = match outcome {
            Ok(response) => response,
            Err(e) => self.responder.respond(&e, &ctx),
        };

        for stage in self.stages[..entered].iter().rev() {
            let hook = std::panic::catch_unwind(AssertUnwindSafe(|| {
                stage.on_response(&ctx, &mut response)
            }));
            if let Err(panic) = hook {
                let err = Error::Internal(format!(
                    "panic in {} response hook: {}",
                    stage.name(),
                    panic_message(panic.as_ref())
                ));
                // Outer stages still decorate the replacement.
                response = self.responder.respond(&err, &ctx);
            }
        }

        response
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("handler", &self.handler)
            .finish()
    }
}

/// Await a stage future, turning a panic into [`Error::Internal`]
async fn guarded<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(Error::Internal(format!(
            "panic in request pipeline: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
