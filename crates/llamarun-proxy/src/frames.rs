//! Server-sent-event framing for errors inside streaming responses.
//!
//! Once response headers are on the wire a status code can no longer carry a
//! failure, so errors become one `data: {...}` frame that ends the stream.
//!
//! Streams are relayed in the backend's SSE framing for both dialects, the
//! Ollama door included, so error frames use the same framing and are not
//! NDJSON lines.

use std::io;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, future};
use tracing::warn;

use crate::adapter::Dialect;

/// Encode one SSE frame carrying a dialect-shaped error document.
pub fn error_frame(dialect: Dialect, message: &str) -> Bytes {
    let body = dialect.error_body(message, None);
    Bytes::from(format!("data: {body}\n\n"))
}

/// Pass backend chunks through and turn a transport failure into a final
/// error frame instead of a truncated body.
pub fn guard_stream<S, E>(
    upstream: S,
    dialect: Dialect,
    model: String,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    upstream.scan(false, move |failed, chunk| {
        if *failed {
            return future::ready(None);
        }
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                *failed = true;
                warn!(model = %model, "Backend stream failed: {e}");
                error_frame(
                    dialect,
                    &format!("Error communicating with runner for '{model}': {e}"),
                )
            }
        };
        future::ready(Some(Ok(bytes)))
    })
}
