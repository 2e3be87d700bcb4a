//! Configuration validation

use crate::types::KeyStrategy;
use crate::Config;
use http::HeaderName;
use std::collections::HashSet;
use switchyard_core::{Error, Result};
use switchyard_middleware::SecurityHeaders;
use switchyard_router::normalize_prefix;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_gateway(config)?;
    validate_rate_limit(config)?;
    validate_routes(config)?;

    config.cors.to_middleware()?;
    SecurityHeaders::with_config(&config.security_headers)?;

    validate_logging(config)?;

    Ok(())
}

fn validate_gateway(config: &Config) -> Result<()> {
    if config.gateway.request_timeout.is_zero() {
        return Err(Error::Config("request_timeout must be > 0".to_string()));
    }

    if config.gateway.request_timeout.as_secs() > 300 {
        tracing::warn!("request_timeout is very high (>5 minutes)");
    }

    if !config.gateway.health_path.starts_with('/') {
        return Err(Error::Config(format!(
            "health_path must start with '/': {}",
            config.gateway.health_path
        )));
    }

    Ok(())
}

fn validate_rate_limit(config: &Config) -> Result<()> {
    let rate_limit = &config.rate_limit;
    if !rate_limit.enabled {
        return Ok(());
    }

    if rate_limit.eviction_factor == 0 {
        return Err(Error::Config(
            "rate_limit.eviction_factor must be >= 1".to_string(),
        ));
    }

    if rate_limit.max_requests == 0 {
        tracing::warn!("rate_limit.max_requests is 0, every proxied request will be rejected");
    }

    if rate_limit.key == KeyStrategy::Header {
        let header = rate_limit.header.as_deref().ok_or_else(|| {
            Error::Config("rate_limit.header is required when key is 'header'".to_string())
        })?;
        HeaderName::from_bytes(header.as_bytes()).map_err(|e| {
            Error::Config(format!("rate_limit.header '{header}' is not a header name: {e}"))
        })?;
    }

    Ok(())
}

fn validate_routes(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();

    for route in config.effective_routes() {
        let prefix = normalize_prefix(&route.prefix)?;
        if !seen.insert(prefix.clone()) {
            return Err(Error::Config(format!("Duplicate route prefix: {prefix}")));
        }

        route.to_route()?;
    }

    Ok(())
}

fn validate_logging(config: &Config) -> Result<()> {
    let logging = &config.observability.logging;
    if !matches!(logging.format.as_str(), "text" | "json") {
        return Err(Error::Config(format!(
            "Invalid log format: {} (must be text or json)",
            logging.format
        )));
    }

    if logging.access_log_level.parse::<tracing::Level>().is_err() {
        return Err(Error::Config(format!(
            "Invalid access_log_level: {}",
            logging.access_log_level
        )));
    }

    Ok(())
}
