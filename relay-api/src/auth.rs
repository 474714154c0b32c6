use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing;

use crate::respond::error_with;
use crate::ApiState;

const API_KEY_HEADER: &str = "X-API-KEY";

/// Guards token registration with the configured API key. Without a
/// configured key the route stays open (development mode).
pub async fn require_api_key(request: Request, next: Next) -> Response {
    let started = Instant::now();

    let expected = request
        .extensions()
        .get::<ApiState>()
        .and_then(|state| state.ctx.config.server.api_key.clone());

    let expected = match expected {
        Some(key) => key,
        None => return next.run(request).await,
    };

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(key) if key == expected => next.run(request).await,
        _ => {
            tracing::debug!("rejected request with missing or wrong API key");
            error_with(StatusCode::UNAUTHORIZED, "认证失败", started)
        }
    }
}
