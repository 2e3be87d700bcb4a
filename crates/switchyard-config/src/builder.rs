//! Configuration builder

use crate::types::{Config, Mode, RateLimitSettings, RouteConfig};
use crate::validator::validate_config;
use std::net::SocketAddr;
use std::time::Duration;
use switchyard_core::Result;

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder starting from defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set listen address
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.config.gateway.listen = addr;
        self
    }

    /// Set the backend response-header timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.gateway.request_timeout = timeout;
        self
    }

    /// Set the deployment mode
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.gateway.mode = mode;
        self
    }

    /// Set the health check path
    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.config.gateway.health_path = path.into();
        self
    }

    /// Add a route. Any route added replaces the built-in defaults.
    pub fn route(mut self, prefix: impl Into<String>, target: impl Into<String>) -> Self {
        self.config.routes.push(RouteConfig::new(prefix, target));
        self
    }

    /// Add a fully specified route
    pub fn route_config(mut self, route: RouteConfig) -> Self {
        self.config.routes.push(route);
        self
    }

    /// Set the rate limit window and budget
    pub fn rate_limit(mut self, max_requests: u32, window: Duration) -> Self {
        self.config.rate_limit.max_requests = max_requests;
        self.config.rate_limit.window = window;
        self
    }

    /// Replace the rate limit settings
    pub fn rate_limit_settings(mut self, settings: RateLimitSettings) -> Self {
        self.config.rate_limit = settings;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        validate_config(&self.config)?;
        Ok(self.config)
    }
}
