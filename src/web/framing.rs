//! Response framing: trace tokens, gzip negotiation, keep-alive and
//! Content-Length.

use std::io::Write;

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use flate2::{write::GzEncoder, Compression};
use uuid::Uuid;

/// Header carrying the caller's opaque trace/correlation token.
pub const TASK_ID_HEADER: &str = "x-task-id";

/// Trace token attached to each request's extensions.
#[derive(Debug, Clone)]
pub struct TaskId(pub String);

/// Adopt the caller's trace token (or mint one) and echo it on the response.
pub async fn task_id_middleware(mut request: Request, next: Next) -> Response {
    let supplied = request
        .headers()
        .get(TASK_ID_HEADER)
        .filter(|v| v.to_str().is_ok())
        .cloned();

    let value = match supplied {
        Some(value) => value,
        None => match HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            Ok(value) => value,
            Err(_) => return next.run(request).await,
        },
    };

    let id = value.to_str().unwrap_or_default().to_string();
    request.extensions_mut().insert(TaskId(id));

    let mut response = next.run(request).await;
    response.headers_mut().insert(TASK_ID_HEADER, value);
    response
}

/// Buffer the response body, gzip it when the caller accepts that, and set
/// an exact Content-Length.
pub async fn framing_middleware(request: Request, next: Next) -> Response {
    let keep_alive = wants_keep_alive(request.headers());
    let gzip = accepts_gzip(request.headers());

    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();

    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Failed to buffer response body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let bytes = if gzip && !bytes.is_empty() && !parts.headers.contains_key(header::CONTENT_ENCODING) {
        match compress(&bytes) {
            Ok(compressed) => {
                parts
                    .headers
                    .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                parts
                    .headers
                    .insert(header::VARY, HeaderValue::from_static("accept-encoding"));
                Bytes::from(compressed)
            }
            Err(e) => {
                tracing::warn!("gzip failed, sending identity body: {}", e);
                bytes
            }
        }
    } else {
        bytes
    };

    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    if keep_alive {
        parts
            .headers
            .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn wants_keep_alive(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("keep-alive"))
        })
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|entry| {
            let mut params = entry.split(';').map(str::trim);
            let coding = params.next().unwrap_or_default();
            let refused = params.any(|p| {
                p.strip_prefix("q=")
                    .and_then(|q| q.parse::<f32>().ok())
                    .is_some_and(|q| q <= 0.0)
            });
            coding.eq_ignore_ascii_case("gzip") && !refused
        })
}

fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
