//! HTTP client for making requests to backend services

use http::{Request, Response};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::error::Error as StdError;
use std::time::Duration;
use switchyard_core::{Body, Error, Result};

/// Backend client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Time allowed for the backend to send response headers
    pub request_timeout: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Idle pooled connections are closed after this long
    pub pool_idle_timeout: Duration,

    /// Maximum idle pooled connections per backend host
    pub pool_max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
        }
    }
}

/// HTTP client for backend requests
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_config(ClientConfig {
            request_timeout: timeout,
            ..Default::default()
        })
    }

    /// Create a new HTTP client from configuration
    pub fn with_config(config: ClientConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(connector);

        Self {
            client,
            timeout: config.request_timeout,
        }
    }

    /// Send a request to a backend.
    ///
    /// `target` only labels errors. Resolves as soon as response headers
    /// arrive; the body is left streaming.
    pub async fn send(&self, req: Request<Body>, target: &str) -> Result<Response<Incoming>> {
        let timeout = tokio::time::timeout(self.timeout, self.client.request(req));

        match timeout.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Error::unavailable(target, error_chain(&e))),
            Err(_) => Err(Error::BackendTimeout {
                target: target.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    /// Get the configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Flatten an error and its sources into one line
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
