//! Configuration loading

use crate::types::{default_routes, Mode, RouteConfig};
use crate::{Config, ConfigFormat};
use regex::Regex;
use std::env;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use switchyard_core::{Error, Result};

/// Listen port
pub const ENV_PORT: &str = "PORT";
/// Wallet backend base URL
pub const ENV_WALLET_SERVICE_URL: &str = "WALLET_SERVICE_URL";
/// User backend base URL
pub const ENV_USER_SERVICE_URL: &str = "USER_SERVICE_URL";
/// Rate limit window in milliseconds
pub const ENV_RATE_LIMIT_WINDOW_MS: &str = "RATE_LIMIT_WINDOW_MS";
/// Requests per client per window
pub const ENV_RATE_LIMIT_MAX_REQUESTS: &str = "RATE_LIMIT_MAX_REQUESTS";
/// `development` or `production`
pub const ENV_GATEWAY_ENV: &str = "GATEWAY_ENV";
/// Backend response-header timeout in milliseconds
pub const ENV_REQUEST_TIMEOUT_MS: &str = "REQUEST_TIMEOUT_MS";

const WALLET_PREFIX: &str = "/api/wallet";
const USER_PREFIX: &str = "/api/user";

/// Load configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {e}",
            path.display()
        ))
    })?;

    let format = ConfigFormat::from_path(path)?;

    load_from_str(&content, format)
}

/// Expand environment variables in configuration string
/// Supports syntax: ${VAR} and ${VAR:-default}
fn expand_env_vars(content: &str) -> Result<String> {
    expand_vars_with(content, |name| env::var(name).ok())
}

fn expand_vars_with(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| Error::Internal(format!("Invalid env var pattern: {e}")))?;
    let mut result = String::with_capacity(content.len());
    let mut last_match = 0;

    for cap in pattern.captures_iter(content) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let var_name = var_name.as_str();
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = match (lookup(var_name), default_value) {
            (Some(val), _) => val,
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                return Err(Error::Config(format!(
                    "Environment variable '{var_name}' not set and no default provided"
                )));
            }
        };

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&value);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);

    Ok(result)
}

/// Load configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    // Expand environment variables first
    let expanded_content = expand_env_vars(content)?;

    let config = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse JSON: {e}")))?,
    };

    Ok(config)
}

/// Load the gateway configuration.
///
/// Starts from the file when one is given, otherwise from defaults; applies
/// the environment overrides on top and validates the result.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => Config::default(),
    };

    apply_env_overrides(&mut config)?;
    crate::validator::validate_config(&config)?;

    Ok(config)
}

/// Build the configuration from defaults and the process environment only
pub fn from_env() -> Result<Config> {
    load_config(None::<&Path>)
}

/// Apply overrides from the process environment
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    apply_overrides_with(config, |name| env::var(name).ok())
}

/// Apply overrides read through `lookup`.
///
/// Unset or empty variables leave the configuration untouched; malformed
/// values are rejected with an error naming the variable.
pub fn apply_overrides_with(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(port) = var(ENV_PORT) {
        config.gateway.listen.set_port(parse_var::<u16>(ENV_PORT, &port)?);
    }

    if let Some(ms) = var(ENV_REQUEST_TIMEOUT_MS) {
        config.gateway.request_timeout =
            Duration::from_millis(parse_var::<u64>(ENV_REQUEST_TIMEOUT_MS, &ms)?);
    }

    if let Some(mode) = var(ENV_GATEWAY_ENV) {
        config.gateway.mode = parse_var::<Mode>(ENV_GATEWAY_ENV, &mode)?;
    }

    if let Some(ms) = var(ENV_RATE_LIMIT_WINDOW_MS) {
        config.rate_limit.window =
            Duration::from_millis(parse_var::<u64>(ENV_RATE_LIMIT_WINDOW_MS, &ms)?);
    }

    if let Some(max) = var(ENV_RATE_LIMIT_MAX_REQUESTS) {
        config.rate_limit.max_requests = parse_var::<u32>(ENV_RATE_LIMIT_MAX_REQUESTS, &max)?;
    }

    let wallet = var(ENV_WALLET_SERVICE_URL);
    let user = var(ENV_USER_SERVICE_URL);
    if wallet.is_some() || user.is_some() {
        if config.routes.is_empty() {
            config.routes = default_routes();
        }
        if let Some(url) = wallet {
            retarget(&mut config.routes, WALLET_PREFIX, &url);
        }
        if let Some(url) = user {
            retarget(&mut config.routes, USER_PREFIX, &url);
        }
    }

    Ok(())
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid value '{value}' for {name}: {e}")))
}

fn retarget(routes: &mut [RouteConfig], prefix: &str, target: &str) {
    for route in routes
        .iter_mut()
        .filter(|r| r.prefix.trim_end_matches('/') == prefix)
    {
        route.target = target.to_string();
    }
}
