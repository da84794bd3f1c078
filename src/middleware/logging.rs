//! Request logging middleware, adapted from the teacher's
//! `middleware::logging::request_logging`: one `tracing` span per
//! request, log level chosen by response status.

use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use std::time::Instant;

pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = tracing::info_span!("request", %method, %path);
    let _guard = span.enter();

    let start = Instant::now();
    drop(_guard);
    let response = next.run(request).await;
    let elapsed = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(%method, %path, %status, elapsed_ms = elapsed.as_millis() as u64, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(%method, %path, %status, elapsed_ms = elapsed.as_millis() as u64, "request rejected");
    } else {
        tracing::info!(%method, %path, %status, elapsed_ms = elapsed.as_millis() as u64, "request completed");
    }

    response
}
