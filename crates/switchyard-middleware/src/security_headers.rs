//! Security headers middleware
//!
//! Adds security-related HTTP headers to responses to protect against
//! common web vulnerabilities (XSS, clickjacking, MIME sniffing, etc.)

use async_trait::async_trait;
use http::{HeaderName, HeaderValue, Response};
use serde::{Deserialize, Serialize};
use switchyard_core::{Body, Error, RequestContext, Result, Stage};

/// Security headers middleware configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityHeadersConfig {
    /// Strict-Transport-Security header
    /// Example: "max-age=15552000; includeSubDomains"
    #[serde(default = "default_hsts")]
    pub hsts: Option<String>,

    /// Content-Security-Policy header
    /// Example: "default-src 'self'; script-src 'self'"
    #[serde(default = "default_csp")]
    pub csp: Option<String>,

    /// X-Frame-Options header
    /// Values: "DENY" or "SAMEORIGIN"
    #[serde(default = "default_frame_options")]
    pub frame_options: Option<String>,

    /// X-Content-Type-Options header
    #[serde(default = "default_content_type_options")]
    pub content_type_options: Option<String>,

    /// X-XSS-Protection header.
    /// Modern browsers ignore it; "0" disables the legacy auditor.
    #[serde(default = "default_xss_protection")]
    pub xss_protection: Option<String>,

    /// Referrer-Policy header
    #[serde(default = "default_referrer_policy")]
    pub referrer_policy: Option<String>,

    /// Cross-Origin-Opener-Policy header
    #[serde(default = "default_cross_origin_opener_policy")]
    pub cross_origin_opener_policy: Option<String>,

    /// Cross-Origin-Resource-Policy header
    #[serde(default = "default_cross_origin_resource_policy")]
    pub cross_origin_resource_policy: Option<String>,

    /// Permissions-Policy header
    /// Example: "geolocation=(), microphone=()"
    #[serde(default)]
    pub permissions_policy: Option<String>,
}

fn default_hsts() -> Option<String> {
    Some("max-age=15552000; includeSubDomains".to_string())
}

fn default_csp() -> Option<String> {
    Some(
        "default-src 'self'; base-uri 'self'; frame-ancestors 'none'; object-src 'none'"
            .to_string(),
    )
}

fn default_frame_options() -> Option<String> {
    Some("DENY".to_string())
}

fn default_content_type_options() -> Option<String> {
    Some("nosniff".to_string())
}

fn default_xss_protection() -> Option<String> {
    Some("0".to_string())
}

fn default_referrer_policy() -> Option<String> {
    Some("no-referrer".to_string())
}

fn default_cross_origin_opener_policy() -> Option<String> {
    Some("same-origin".to_string())
}

fn default_cross_origin_resource_policy() -> Option<String> {
    Some("same-origin".to_string())
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            hsts: default_hsts(),
            csp: default_csp(),
            frame_options: default_frame_options(),
            content_type_options: default_content_type_options(),
            xss_protection: default_xss_protection(),
            referrer_policy: default_referrer_policy(),
            cross_origin_opener_policy: default_cross_origin_opener_policy(),
            cross_origin_resource_policy: default_cross_origin_resource_policy(),
            permissions_policy: None,
        }
    }
}

impl SecurityHeadersConfig {
    /// Configured headers as `(name, value)` pairs, unset ones skipped
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        [
            ("strict-transport-security", &self.hsts),
            ("content-security-policy", &self.csp),
            ("x-frame-options", &self.frame_options),
            ("x-content-type-options", &self.content_type_options),
            ("x-xss-protection", &self.xss_protection),
            ("referrer-policy", &self.referrer_policy),
            ("cross-origin-opener-policy", &self.cross_origin_opener_policy),
            (
                "cross-origin-resource-policy",
                &self.cross_origin_resource_policy,
            ),
            ("permissions-policy", &self.permissions_policy),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
    }
}

/// Security headers middleware
///
/// Adds the configured headers to every response, error responses included.
/// Values are parsed once at construction.
///
/// # Example
///
/// ```
/// use switchyard_middleware::SecurityHeaders;
///
/// let security = SecurityHeaders::default();
/// ```
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    /// Create a new security headers middleware with default configuration
    pub fn new() -> Self {
        Self::with_config(&SecurityHeadersConfig::default())
            .unwrap_or_else(|_| Self { headers: Vec::new() })
    }

    /// Create a new security headers middleware with custom configuration.
    ///
    /// Fails if a configured value is not a valid header value.
    pub fn with_config(config: &SecurityHeadersConfig) -> Result<Self> {
        let headers = config
            .pairs()
            .map(|(name, value)| {
                let value = HeaderValue::from_str(value)
                    .map_err(|e| Error::Config(format!("Invalid {name} header: {e}")))?;
                Ok((HeaderName::from_static(name), value))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { headers })
    }

    /// Number of headers added to each response
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether no header is configured
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for SecurityHeaders {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    fn on_response(&self, _ctx: &RequestContext, response: &mut Response<Body>) {
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{get, run};
    use http::StatusCode;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_default_security_headers() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(SecurityHeaders::default())];

        let response = run(&stages, get("/api/user/1")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("strict-transport-security"));
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert!(response.headers()["content-security-policy"]
            .to_str()
            .unwrap()
            .contains("frame-ancestors 'none'"));
        assert_eq!(response.headers().get("referrer-policy").unwrap(), "no-referrer");
        assert!(!response.headers().contains_key("permissions-policy"));
    }

    #[tokio::test]
    async fn test_custom_security_headers() {
        let config = SecurityHeadersConfig {
            hsts: Some("max-age=0".to_string()),
            csp: Some("default-src 'none'".to_string()),
            xss_protection: None,
            permissions_policy: Some("geolocation=()".to_string()),
            ..Default::default()
        };

        let security = SecurityHeaders::with_config(&config).unwrap();
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(security)];

        let response = run(&stages, get("/test")).await;

        assert_eq!(
            response.headers().get("strict-transport-security").unwrap(),
            "max-age=0"
        );
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
        assert_eq!(
            response.headers().get("permissions-policy").unwrap(),
            "geolocation=()"
        );
        assert!(!response.headers().contains_key("x-xss-protection"));
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        let config = SecurityHeadersConfig {
            csp: Some("default-src\n'self'".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            SecurityHeaders::with_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: SecurityHeadersConfig =
            serde_json::from_str(r#"{"hsts": null, "frame_options": "DENY"}"#).unwrap();

        assert_eq!(config.hsts, None);
        assert_eq!(config.frame_options.as_deref(), Some("DENY"));
        assert_eq!(config.content_type_options.as_deref(), Some("nosniff"));
    }
}
