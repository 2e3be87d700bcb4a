//! HTTP server implementation

use crate::handler::GatewayHandler;
use crate::health::Health;
use crate::shutdown::ShutdownSignal;
use crate::RuntimeState;
use http::{Request, Response};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_config::Config;
use switchyard_core::{body, Body, Error, ErrorResponder, Pipeline, RequestContext, Result};
use switchyard_middleware::{FixedWindowLimiter, MiddlewareBuilder, SecurityHeaders};
use switchyard_proxy::{ClientConfig, HttpClient, HttpProxy, ProxyConfig};
use switchyard_router::Router;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Lower bound on the interval between rate limit sweeps
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Request counters shared by every connection
#[derive(Debug, Default)]
struct RequestCounters {
    total: AtomicUsize,
    active: AtomicUsize,
}

impl RequestCounters {
    fn begin(self: &Arc<Self>) -> InFlight {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::SeqCst);
        InFlight(Arc::clone(self))
    }
}

/// Marks one request as in flight until dropped, including when the caller
/// disconnects and the request future is cancelled.
struct InFlight(Arc<RequestCounters>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// HTTP server
pub struct Server {
    config: Config,
    router: Router,
    pipeline: Pipeline,
    limiter: Option<Arc<FixedWindowLimiter>>,
    state: Arc<RwLock<RuntimeState>>,
    shutdown: ShutdownSignal,
    counters: Arc<RequestCounters>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen", &self.config.gateway.listen)
            .field("pipeline", &self.pipeline)
            .field("routes", &self.router.len())
            .field("request_count", &self.request_count())
            .finish()
    }
}

impl Server {
    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Get the current state
    pub async fn state(&self) -> RuntimeState {
        *self.state.read().await
    }

    /// Get listen address
    pub fn listen_addr(&self) -> SocketAddr {
        self.config.gateway.listen
    }

    /// Get router
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Rate limiter shared by the rate limit stage and the sweeper
    pub fn limiter(&self) -> Option<&Arc<FixedWindowLimiter>> {
        self.limiter.as_ref()
    }

    /// Requests handled since startup
    pub fn request_count(&self) -> usize {
        self.counters.total.load(Ordering::Relaxed)
    }

    /// Requests currently in flight
    pub fn active_requests(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Get shutdown signal
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run one request through the pipeline without a connection
    pub async fn handle(&self, req: Request<Body>, peer: Option<SocketAddr>) -> Response<Body> {
        let _in_flight = self.counters.begin();
        let ctx = RequestContext::for_request(&req, peer);
        self.pipeline.run(req, ctx).await
    }

    /// Bind the configured address and run the server
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr()).await.map_err(|e| {
            Error::Runtime(format!("Failed to bind to {}: {}", self.listen_addr(), e))
        })?;

        self.serve(listener).await
    }

    /// Serve connections from `listener` until shutdown is triggered, then
    /// drain in-flight requests for up to `shutdown_timeout`.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        *self.state.write().await = RuntimeState::Running;

        let local_addr = listener.local_addr()?;
        tracing::info!(
            listen = %local_addr,
            routes = self.router.len(),
            mode = ?self.config.gateway.mode,
            "Gateway listening"
        );

        let sweeper = self
            .limiter
            .as_ref()
            .map(|limiter| spawn_sweeper(Arc::clone(limiter), self.shutdown.clone()));

        let shutdown = self.shutdown.wait();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            tracing::trace!("Accepted connection from {}", peer);
                            tokio::spawn(serve_connection(
                                stream,
                                peer,
                                self.pipeline.clone(),
                                Arc::clone(&self.counters),
                                self.shutdown.clone(),
                            ));
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(listener);
        *self.state.write().await = RuntimeState::ShuttingDown;

        self.drain().await;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        *self.state.write().await = RuntimeState::Stopped;
        tracing::info!(requests = self.request_count(), "Server stopped");

        Ok(())
    }

    async fn drain(&self) {
        let shutdown_timeout = self.config.gateway.shutdown_timeout;
        let start = Instant::now();

        tracing::info!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Waiting for in-flight requests to complete"
        );

        loop {
            let active = self.active_requests();

            if active == 0 {
                tracing::info!("All requests completed, shutting down cleanly");
                break;
            }

            if start.elapsed() >= shutdown_timeout {
                tracing::warn!(
                    active_requests = active,
                    "Shutdown timeout reached, forcing shutdown"
                );
                break;
            }

            tracing::debug!(
                active_requests = active,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Waiting for active requests to complete"
            );

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    pipeline: Pipeline,
    counters: Arc<RequestCounters>,
    shutdown: ShutdownSignal,
) {
    let service = service_fn(move |req: Request<Incoming>| {
        let pipeline = pipeline.clone();
        let counters = Arc::clone(&counters);
        async move {
            let _in_flight = counters.begin();
            let req = req.map(body::incoming);
            let ctx = RequestContext::for_request(&req, Some(peer));
            Ok::<_, Infallible>(pipeline.run(req, ctx).await)
        }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.wait() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(client = %peer, error = %e, "HTTP connection closed with error");
    }
}

/// Periodically drop rate limit windows nobody has touched for a while
fn spawn_sweeper(limiter: Arc<FixedWindowLimiter>, shutdown: ShutdownSignal) -> JoinHandle<()> {
    let period = limiter.window().max(MIN_SWEEP_INTERVAL);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = limiter.evict_stale(Instant::now());
                    if evicted > 0 {
                        tracing::debug!(evicted, tracked = limiter.len(), "Evicted stale rate limit windows");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
    })
}

/// Server builder
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: Option<Config>,
    shutdown: Option<ShutdownSignal>,
}

impl ServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an existing shutdown signal
    pub fn shutdown_signal(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Build the server.
    ///
    /// Stage order: request id, access log, security headers, CORS, health,
    /// rate limit, then routing and forwarding.
    pub fn build(self) -> Result<Server> {
        let config = self
            .config
            .ok_or_else(|| Error::Config("config is required".to_string()))?;

        let router = Router::new(config.build_routes()?)?;
        for route in router.routes() {
            tracing::info!(prefix = %route.prefix, target = %route.target, "Route registered");
        }

        let client = HttpClient::with_config(ClientConfig {
            request_timeout: config.gateway.request_timeout,
            connect_timeout: config.proxy.connect_timeout,
            pool_idle_timeout: config.proxy.pool_idle_timeout,
            pool_max_idle_per_host: config.proxy.pool_max_idle_per_host,
        });
        let proxy = HttpProxy::new(
            client,
            ProxyConfig {
                preserve_host: config.proxy.preserve_host,
                add_forwarded_headers: config.proxy.forwarded_headers,
            },
        );

        let mut stages = MiddlewareBuilder::new().with_request_id();

        let logging = &config.observability.logging;
        if logging.access_log {
            let log_level = logging.access_log_level.parse().map_err(|_| {
                Error::Config(format!(
                    "Invalid access_log_level: {}",
                    logging.access_log_level
                ))
            })?;
            stages = stages.with_logging_config(switchyard_middleware::LoggingConfig {
                log_level,
                log_headers: logging.log_headers,
                ..Default::default()
            });
        }

        stages = stages.with_security_headers_stage(SecurityHeaders::with_config(
            &config.security_headers,
        )?);

        if config.cors.enabled {
            stages = stages.with_cors_config(config.cors.to_middleware()?);
        }

        stages = stages.with_stage(Arc::new(Health::new(config.gateway.health_path.as_str())));

        let limiter = if config.rate_limit.enabled {
            let rate_limit = config.rate_limit.to_middleware();
            let limiter = Arc::new(FixedWindowLimiter::with_config(&rate_limit));
            stages = stages.with_rate_limiter(rate_limit, Arc::clone(&limiter));
            Some(limiter)
        } else {
            tracing::warn!("Rate limiting disabled");
            None
        };

        let handler = GatewayHandler::new(router.clone(), Arc::new(proxy));
        let pipeline = Pipeline::new(
            stages.build(),
            Arc::new(handler),
            ErrorResponder::new(config.gateway.mode.is_development()),
        );

        tracing::debug!(?pipeline, "Pipeline assembled");

        Ok(Server {
            config,
            router,
            pipeline,
            limiter,
            state: Arc::new(RwLock::new(RuntimeState::Initializing)),
            shutdown: self.shutdown.unwrap_or_default(),
            counters: Arc::new(RequestCounters::default()),
        })
    }
}
