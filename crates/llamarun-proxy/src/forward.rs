//! Request forwarding to a backend with streaming support.
//!
//! The translated body is re-encoded, so framing headers from the client are
//! dropped along with the hop-by-hop set. Everything else is passed on.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use llamarun_core::RuntimeError;

use crate::adapter::Dialect;
use crate::frames::guard_stream;

/// Headers that should NOT be forwarded.
const SKIPPED_HEADERS: &[&str] = &[
    // hop-by-hop
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    // the backend has its own address
    "host",
    // the body is re-encoded
    "content-length",
    "content-type",
    "accept-encoding",
];

/// Check if a header should be forwarded.
pub fn should_forward_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !SKIPPED_HEADERS.contains(&lower.as_str())
}

/// Send the canonical body to the backend.
///
/// Only transport failures are errors here; a backend that answers with an
/// error status is returned as-is for the caller to relay.
pub async fn send(
    client: &Client,
    method: Method,
    url: &str,
    headers: &HeaderMap,
    body: &Value,
    model: &str,
) -> Result<reqwest::Response, RuntimeError> {
    debug!(model = %model, "Forwarding to {url}");

    let mut request = client.request(method, url);
    for (name, value) in headers {
        if should_forward_header(name.as_str()) {
            request = request.header(name, value);
        }
    }

    request
        .json(body)
        .send()
        .await
        .map_err(|e| RuntimeError::BackendCommunication {
            model: model.to_string(),
            reason: e.to_string(),
        })
}

/// Relay a streaming (SSE) backend response chunk by chunk.
pub fn streaming_response(response: reqwest::Response, dialect: Dialect, model: String) -> Response {
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("text/event-stream"));

    let body = Body::from_stream(guard_stream(response.bytes_stream(), dialect, model));

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Read a whole backend response body.
pub async fn read_body(
    response: reqwest::Response,
    model: &str,
) -> Result<(StatusCode, bytes::Bytes), RuntimeError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| RuntimeError::BackendCommunication {
            model: model.to_string(),
            reason: format!("failed to read response: {e}"),
        })?;
    Ok((status, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_forward_header() {
        assert!(should_forward_header("accept"));
        assert!(should_forward_header("authorization"));
        assert!(should_forward_header("x-request-id"));

        assert!(!should_forward_header("Host"));
        assert!(!should_forward_header("connection"));
        assert!(!should_forward_header("content-length"));
        assert!(!should_forward_header("transfer-encoding"));
    }
}
