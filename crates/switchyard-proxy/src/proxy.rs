//! HTTP proxy implementation

use crate::client::HttpClient;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Request, Response, Uri, Version};
use std::net::IpAddr;
use switchyard_core::{body, Body, Error, Result};
use switchyard_router::Route;
use url::Url;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Headers that describe a single connection and never cross the proxy
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Whether to keep the caller's Host header instead of the backend's
    pub preserve_host: bool,

    /// Whether to add X-Forwarded-* headers
    pub add_forwarded_headers: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            preserve_host: false,
            add_forwarded_headers: true,
        }
    }
}

/// HTTP proxy
#[derive(Debug, Clone)]
pub struct HttpProxy {
    client: HttpClient,
    config: ProxyConfig,
}

impl HttpProxy {
    /// Create a new HTTP proxy
    pub fn new(client: HttpClient, config: ProxyConfig) -> Self {
        Self { client, config }
    }

    /// Forward a request to the route's backend and relay the answer.
    ///
    /// Backend responses of any status are returned as-is; only transport
    /// failures and timeouts become errors. Both bodies stream.
    pub async fn forward(
        &self,
        mut req: Request<Body>,
        route: &Route,
        client_ip: Option<IpAddr>,
    ) -> Result<Response<Body>> {
        let target = route.info().target;
        let upstream_uri = build_upstream_uri(route, req.uri())?;

        tracing::debug!(
            method = %req.method(),
            uri = %req.uri(),
            upstream = %upstream_uri,
            "Forwarding request"
        );

        *req.uri_mut() = upstream_uri;
        *req.version_mut() = Version::HTTP_11;
        self.transform_headers(&mut req, &route.target, client_ip)?;

        let response = self.client.send(req, &target).await?;

        let (mut parts, incoming) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);

        tracing::debug!(
            upstream = %target,
            status = parts.status.as_u16(),
            "Backend responded"
        );

        Ok(Response::from_parts(parts, body::incoming(incoming)))
    }

    /// Transform request headers
    fn transform_headers(
        &self,
        req: &mut Request<Body>,
        target: &Url,
        client_ip: Option<IpAddr>,
    ) -> Result<()> {
        let headers = req.headers_mut();
        strip_hop_by_hop(headers);

        let original_host = headers.get(header::HOST).cloned();

        if !self.config.preserve_host {
            headers.insert(
                header::HOST,
                HeaderValue::from_str(&authority(target))
                    .map_err(|e| Error::InvalidRequest(format!("Invalid host: {e}")))?,
            );
        }

        if self.config.add_forwarded_headers {
            if let Some(ip) = client_ip {
                let forwarded_for = match joined(headers, &X_FORWARDED_FOR) {
                    Some(prior) => format!("{prior}, {ip}"),
                    None => ip.to_string(),
                };
                headers.insert(
                    X_FORWARDED_FOR,
                    HeaderValue::from_str(&forwarded_for).map_err(|e| {
                        Error::InvalidRequest(format!("Invalid X-Forwarded-For: {e}"))
                    })?,
                );
            }

            headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

            if let Some(host) = original_host {
                headers.insert(X_FORWARDED_HOST, host);
            }
        }

        Ok(())
    }
}

/// Build the backend URI for an inbound request URI
pub fn build_upstream_uri(route: &Route, uri: &Uri) -> Result<Uri> {
    let base = route.target.path().trim_end_matches('/');
    let path = route.rewrite_path(uri.path());

    let mut upstream = format!(
        "{}://{}{}{}",
        route.target.scheme(),
        authority(&route.target),
        base,
        path
    );
    if let Some(query) = uri.query() {
        upstream.push('?');
        upstream.push_str(query);
    }

    upstream
        .parse()
        .map_err(|e| Error::InvalidRequest(format!("Invalid upstream URI '{upstream}': {e}")))
}

/// Remove hop-by-hop headers, including those the Connection header names
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// `host[:port]` of a backend URL
fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// All values of a header joined with `, `
fn joined(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    (!values.is_empty()).then(|| values.join(", "))
}
