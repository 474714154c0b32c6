use anyhow::Result;
use axum::{
    extract::Extension,
    middleware,
    routing::{get, post},
    Router,
};
use std::env;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing;

use crate::auth;
use crate::handlers;
use crate::ApiState;

pub fn build_router(state: ApiState) -> Router {
    // Permissive CORS unless CORS_ORIGINS narrows it down.
    let cors_layer = if let Ok(origins) = env::var("CORS_ORIGINS") {
        let mut cors = CorsLayer::new();
        for origin in origins.split(',').map(str::trim) {
            if let Ok(parsed) = origin.parse::<axum::http::HeaderValue>() {
                cors = cors.allow_origin(parsed);
            }
        }
        cors.allow_methods(Any).allow_headers(Any)
    } else {
        tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
        CorsLayer::permissive()
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route(
            "/v1/push/set_user_tokens",
            post(handlers::set_user_tokens)
                .route_layer(middleware::from_fn(auth::require_api_key)),
        )
        .route("/v1/push/get_user_token", get(handlers::get_user_token))
        .route(
            "/v1/push/get_user_tokens_list",
            get(handlers::get_user_tokens_list),
        )
        .route("/v1/push/remove_user_token", post(handlers::remove_user_token))
        .route(
            "/v1/push/remove_user_all_tokens",
            post(handlers::remove_user_all_tokens),
        )
        .route(
            "/v1/push/get_user_blocked_chats",
            get(handlers::get_user_blocked_chats),
        )
        .route("/v1/push/add_blocked_chat", post(handlers::add_blocked_chat))
        .route(
            "/v1/push/remove_blocked_chat",
            post(handlers::remove_blocked_chat),
        )
        .route("/v1/push/check_receipts", post(handlers::check_receipts))
        .route("/v1/push/provider_health", get(handlers::provider_health))
        .route(
            "/v1/push/remove_notified_pin",
            post(handlers::remove_notified_pin),
        )
        .route(
            "/v1/push/clear_keyspace",
            post(handlers::clear_keyspace)
                .route_layer(middleware::from_fn(auth::require_api_key)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(Extension(state))
                .layer(cors_layer),
        )
}

pub async fn run(state: ApiState) -> Result<()> {
    let host = state.ctx.config.server.host.clone();
    let api_port = state.ctx.config.server.api_port;

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", host, api_port).parse()?;
    tracing::info!("Starting management API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
