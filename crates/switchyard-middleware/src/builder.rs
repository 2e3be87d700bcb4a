//! Middleware chain builder
//!
//! This module provides a builder pattern for constructing stage chains.
//! Stages run in the order they are added.

use crate::*;
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::Stage;

/// Middleware chain builder
#[derive(Debug, Default)]
pub struct MiddlewareBuilder {
    stages: Vec<Arc<dyn Stage>>,
}

impl MiddlewareBuilder {
    /// Create a new middleware builder
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Add Request ID propagation
    #[must_use]
    pub fn with_request_id(mut self) -> Self {
        self.stages.push(Arc::new(RequestId::new()));
        self
    }

    /// Add access logging
    #[must_use]
    pub fn with_logging(mut self) -> Self {
        self.stages.push(Arc::new(RequestLogger::new()));
        self
    }

    /// Add access logging with custom configuration
    #[must_use]
    pub fn with_logging_config(mut self, config: LoggingConfig) -> Self {
        self.stages.push(Arc::new(RequestLogger::with_config(config)));
        self
    }

    /// Add security headers with the default set
    #[must_use]
    pub fn with_security_headers(mut self) -> Self {
        self.stages.push(Arc::new(SecurityHeaders::new()));
        self
    }

    /// Add security headers built from configuration
    #[must_use]
    pub fn with_security_headers_stage(mut self, stage: SecurityHeaders) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Add CORS middleware
    #[must_use]
    pub fn with_cors(mut self) -> Self {
        self.stages.push(Arc::new(Cors::new()));
        self
    }

    /// Add CORS middleware with custom configuration
    #[must_use]
    pub fn with_cors_config(mut self, config: CorsConfig) -> Self {
        self.stages.push(Arc::new(Cors::with_config(config)));
        self
    }

    /// Add Rate Limiting middleware with default config
    #[must_use]
    pub fn with_rate_limit(mut self) -> Self {
        self.stages.push(Arc::new(RateLimit::new()));
        self
    }

    /// Add Rate Limiting middleware with specific limits
    #[must_use]
    pub fn with_rate_limit_params(mut self, max_requests: u32, window: Duration) -> Self {
        let config = RateLimitConfig {
            max_requests,
            window,
            ..Default::default()
        };
        self.stages.push(Arc::new(RateLimit::with_config(config)));
        self
    }

    /// Add Rate Limiting middleware around a shared limiter
    #[must_use]
    pub fn with_rate_limiter(
        mut self,
        config: RateLimitConfig,
        limiter: Arc<FixedWindowLimiter>,
    ) -> Self {
        self.stages
            .push(Arc::new(RateLimit::with_limiter(config, limiter)));
        self
    }

    /// Add custom stage
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Build the stage chain
    ///
    /// Returns an `Arc<[Arc<dyn Stage>]>` for efficient sharing.
    #[must_use]
    pub fn build(self) -> Arc<[Arc<dyn Stage>]> {
        self.stages.into()
    }

    /// Get the number of stages in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if the chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
