//! Streaming body type

use crate::Error;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};

/// Body used for every request and response that crosses the gateway.
///
/// Inbound bodies and backend responses are wrapped without buffering, so
/// payloads stream through the pipeline chunk by chunk.
pub type Body = http_body_util::combinators::UnsyncBoxBody<Bytes, Error>;

/// Body with the given bytes
pub fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Body with no content
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Wrap a hyper body as it arrives from a connection
pub fn incoming(body: hyper::body::Incoming) -> Body {
    body.map_err(Error::from).boxed_unsync()
}

/// Collect a body into memory.
///
/// Only meant for small gateway-generated payloads and tests; proxied
/// bodies are never collected.
pub async fn to_bytes(body: Body) -> crate::Result<Bytes> {
    Ok(body.collect().await?.to_bytes())
}
