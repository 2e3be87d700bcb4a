//! CORS (Cross-Origin Resource Sharing) middleware

use async_trait::async_trait;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use std::fmt;
use std::time::Duration;
use switchyard_core::{body, Body, Flow, RequestContext, Result, Stage};

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins (e.g., "*", "https://example.com")
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods
    pub allowed_methods: Vec<Method>,
    /// Allowed request headers
    pub allowed_headers: Vec<String>,
    /// Headers exposed to the browser
    pub exposed_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: Duration,
    /// Whether to allow credentials (cookies, auth headers)
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![
                Method::GET,
                Method::HEAD,
                Method::PUT,
                Method::PATCH,
                Method::POST,
                Method::DELETE,
            ],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "X-Request-ID".to_string(),
            ],
            exposed_headers: vec![
                "X-Request-ID".to_string(),
                "RateLimit-Limit".to_string(),
                "RateLimit-Remaining".to_string(),
                "RateLimit-Reset".to_string(),
                "Retry-After".to_string(),
            ],
            max_age: Duration::from_secs(3600),
            allow_credentials: false,
        }
    }
}

/// Origin header of the request, kept for the response hook
#[derive(Debug, Clone)]
struct RequestOrigin(Option<HeaderValue>);

/// CORS middleware
///
/// Answers preflight `OPTIONS` requests with `204` and adds
/// `Access-Control-*` headers to every response that passed through,
/// including gateway errors.
#[derive(Clone)]
pub struct Cors {
    config: CorsConfig,
    any_origin: bool,
    allow_methods: Option<HeaderValue>,
    allow_headers: Option<HeaderValue>,
    expose_headers: Option<HeaderValue>,
    max_age: HeaderValue,
}

impl Cors {
    /// Create a new CORS middleware with default config (permissive)
    pub fn new() -> Self {
        Self::with_config(CorsConfig::default())
    }

    /// Create a new CORS middleware with custom config
    pub fn with_config(config: CorsConfig) -> Self {
        let methods = config
            .allowed_methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(",");

        Self {
            any_origin: config.allowed_origins.iter().any(|o| o == "*"),
            allow_methods: list_value(&methods),
            allow_headers: list_value(&config.allowed_headers.join(", ")),
            expose_headers: list_value(&config.exposed_headers.join(", ")),
            max_age: HeaderValue::from(config.max_age.as_secs()),
            config,
        }
    }

    /// Create a permissive CORS middleware (allow all)
    pub fn permissive() -> Self {
        Self::new()
    }

    /// Create a restrictive CORS middleware for specific origins
    pub fn for_origins(origins: Vec<String>) -> Self {
        let config = CorsConfig {
            allowed_origins: origins,
            ..Default::default()
        };
        Self::with_config(config)
    }

    /// Check if origin is allowed
    fn is_origin_allowed(&self, origin: &str) -> bool {
        self.any_origin || self.config.allowed_origins.iter().any(|o| o == origin)
    }

    /// Get the appropriate Access-Control-Allow-Origin value
    fn allow_origin(&self, request_origin: Option<&HeaderValue>) -> Option<HeaderValue> {
        if self.any_origin && !self.config.allow_credentials {
            return Some(HeaderValue::from_static("*"));
        }

        // Credentials forbid "*", so allowed origins are echoed back
        request_origin
            .filter(|origin| {
                origin
                    .to_str()
                    .map(|o| self.is_origin_allowed(o))
                    .unwrap_or(false)
            })
            .cloned()
    }

    /// Build the preflight response
    fn preflight(&self) -> Response<Body> {
        let mut response = Response::new(body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        let headers = response.headers_mut();
        if let Some(methods) = &self.allow_methods {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods.clone());
        }
        if let Some(allowed) = &self.allow_headers {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allowed.clone());
        }
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());

        response
    }
}

fn list_value(list: &str) -> Option<HeaderValue> {
    if list.is_empty() {
        return None;
    }
    HeaderValue::from_str(list).ok()
}

impl Default for Cors {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cors")
            .field("allowed_origins", &self.config.allowed_origins)
            .field("allow_credentials", &self.config.allow_credentials)
            .finish()
    }
}

#[async_trait]
impl Stage for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn on_request(&self, req: Request<Body>, ctx: &mut RequestContext) -> Result<Flow> {
        ctx.extensions
            .insert(RequestOrigin(req.headers().get(header::ORIGIN).cloned()));

        if req.method() == Method::OPTIONS {
            return Ok(Flow::Respond(self.preflight()));
        }

        Ok(Flow::Continue(req))
    }

    fn on_response(&self, ctx: &RequestContext, response: &mut Response<Body>) {
        let origin = ctx
            .extensions
            .get::<RequestOrigin>()
            .and_then(|o| o.0.as_ref());

        let headers = response.headers_mut();

        if let Some(allow_origin) = self.allow_origin(origin) {
            if allow_origin != "*" {
                headers.append(header::VARY, HeaderValue::from_static("Origin"));
            }
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        }

        if let Some(exposed) = &self.expose_headers {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, exposed.clone());
        }

        if self.config.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::run;
    use std::sync::Arc;

    fn request(method: Method, origin: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/api/user/1")
            .header(header::ORIGIN, origin)
            .body(body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_cors_permissive() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(Cors::permissive())];

        let response = run(&stages, request(Method::GET, "https://example.com")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_EXPOSE_HEADERS));
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(Cors::permissive())];

        let mut req = request(Method::OPTIONS, "https://example.com");
        req.headers_mut().insert(
            header::ACCESS_CONTROL_REQUEST_METHOD,
            HeaderValue::from_static("POST"),
        );
        let response = run(&stages, req).await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "GET,HEAD,PUT,PATCH,POST,DELETE"
        );
        assert_eq!(headers.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "3600");
        // Preflight never reaches the handler
        assert!(!headers.contains_key("x-handled"));
    }

    #[tokio::test]
    async fn test_cors_specific_origins() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(Cors::for_origins(vec![
            "https://allowed.com".to_string(),
        ]))];

        let response = run(&stages, request(Method::GET, "https://allowed.com")).await;
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://allowed.com"
        );
        assert_eq!(response.headers().get(header::VARY).unwrap(), "Origin");

        let response = run(&stages, request(Method::GET, "https://evil.com")).await;
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_cors_with_credentials() {
        let config = CorsConfig {
            allow_credentials: true,
            ..Default::default()
        };
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(Cors::with_config(config))];

        let response = run(&stages, request(Method::GET, "https://example.com")).await;

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .unwrap(),
            "true"
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://example.com"
        );
    }
}
