use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_LENGTH, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

const MAX_BUFFERED_BODY_BYTES: usize = 64 * 1024;
const MAX_LOGGED_BODY_BYTES: usize = 2048;

/// Records diagnostics whenever a handler returns a 4xx or 5xx status.
/// The response body is buffered so the same payload is still forwarded
/// to the caller after logging.
pub async fn log_error_responses(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let uri = req.uri().to_string();
    let start = Instant::now();

    let response = next.run(req).await;
    let status = response.status();

    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let latency_ms = start.elapsed().as_millis() as u64;
    let (mut parts, body) = response.into_parts();
    match to_bytes(body, MAX_BUFFERED_BODY_BYTES).await {
        Ok(bytes) => {
            let preview = if bytes.len() > MAX_LOGGED_BODY_BYTES {
                format!(
                    "{}... (truncated, {} bytes total)",
                    String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY_BYTES]),
                    bytes.len()
                )
            } else {
                String::from_utf8_lossy(&bytes).to_string()
            };
            if status.is_server_error() {
                tracing::error!(status = status.as_u16(), method, uri, latency_ms, body = %preview, "Request completed with error status");
            } else {
                tracing::warn!(status = status.as_u16(), method, uri, latency_ms, body = %preview, "Request completed with error status");
            }
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(err) => {
            parts.headers.remove(CONTENT_LENGTH);
            tracing::error!(status = status.as_u16(), method, uri, latency_ms, error = ?err, "Failed to read error response body");
            Response::from_parts(parts, Body::empty())
        }
    }
}
