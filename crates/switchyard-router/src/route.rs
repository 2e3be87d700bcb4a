//! Route definition and builder

use switchyard_core::{Error, Result, RouteInfo};
use url::Url;

/// Route definition: every path under `prefix` goes to `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Path prefix, normalized without a trailing slash (except for `/`)
    pub prefix: String,

    /// Backend base URL
    pub target: Url,

    /// Replacement for the matched prefix when forwarding.
    /// `None` keeps the path as received.
    pub rewrite: Option<String>,
}

impl Route {
    /// Create a new route builder
    pub fn builder() -> RouteBuilder {
        RouteBuilder::new()
    }

    /// Whether the route serves `path`.
    ///
    /// Matching is segment-aware: `/api/wallet` serves `/api/wallet` and
    /// `/api/wallet/...` but not `/api/walletx`.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Path to send to the backend for a matched request path
    pub fn rewrite_path(&self, path: &str) -> String {
        let Some(replacement) = self.rewrite.as_deref() else {
            return path.to_string();
        };

        let rest = if self.prefix == "/" {
            path
        } else {
            path.strip_prefix(self.prefix.as_str()).unwrap_or(path)
        };

        let rewritten = format!("{}{}", replacement.trim_end_matches('/'), rest);
        if rewritten.is_empty() {
            "/".to_string()
        } else {
            rewritten
        }
    }

    /// Summary recorded in the request context
    pub fn info(&self) -> RouteInfo {
        RouteInfo {
            prefix: self.prefix.clone(),
            target: self.target.as_str().trim_end_matches('/').to_string(),
        }
    }
}

/// Builder for constructing routes
#[derive(Debug, Default)]
pub struct RouteBuilder {
    prefix: Option<String>,
    target: Option<String>,
    rewrite: Option<String>,
}

impl RouteBuilder {
    /// Create a new route builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the backend base URL
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the replacement for the matched prefix
    pub fn rewrite(mut self, rewrite: impl Into<String>) -> Self {
        self.rewrite = Some(rewrite.into());
        self
    }

    /// Build the route
    pub fn build(self) -> Result<Route> {
        let prefix = self
            .prefix
            .ok_or_else(|| Error::Config("route prefix is required".to_string()))?;

        let target = self
            .target
            .ok_or_else(|| Error::Config("route target is required".to_string()))?;

        Ok(Route {
            prefix: normalize_prefix(&prefix)?,
            target: parse_target(&target)?,
            rewrite: self.rewrite.map(|r| validate_rewrite(&prefix, r)).transpose()?,
        })
    }
}

/// Normalize a configured prefix: must start with `/`, trailing slashes dropped
pub fn normalize_prefix(prefix: &str) -> Result<String> {
    if !prefix.starts_with('/') {
        return Err(Error::Config(format!(
            "route prefix '{prefix}' must start with '/'"
        )));
    }
    if prefix.contains(['?', '#']) {
        return Err(Error::Config(format!(
            "route prefix '{prefix}' must not contain a query or fragment"
        )));
    }

    let trimmed = prefix.trim_end_matches('/');
    Ok(if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    })
}

fn parse_target(target: &str) -> Result<Url> {
    let url = Url::parse(target)
        .map_err(|e| Error::Config(format!("invalid route target '{target}': {e}")))?;

    if url.scheme() != "http" {
        return Err(Error::Config(format!(
            "route target '{target}' must use the http scheme"
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::Config(format!("route target '{target}' has no host")));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(Error::Config(format!(
            "route target '{target}' must not contain a query or fragment"
        )));
    }

    Ok(url)
}

fn validate_rewrite(prefix: &str, rewrite: String) -> Result<String> {
    if !rewrite.is_empty() && !rewrite.starts_with('/') {
        return Err(Error::Config(format!(
            "rewrite '{rewrite}' for prefix '{prefix}' must be empty or start with '/'"
        )));
    }
    Ok(rewrite)
}
