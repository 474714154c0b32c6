pub mod auth;
pub mod handlers;
pub mod respond;
pub mod server;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use relay_core::RelayContext;
use relay_delivery::Dispatcher;

pub use server::{build_router, run};

/// Everything a management handler needs, injected per request.
#[derive(Clone)]
pub struct ApiState {
    pub ctx: RelayContext,
    pub dispatcher: Arc<Dispatcher>,
    pub session_connected: Arc<AtomicBool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use relay_core::config::{Config, ExpoConfig, ServerConfig, SocketConfig, StoreConfig};
    use relay_core::Store;
    use relay_delivery::DispatcherConfig;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_config(db_path: &str, api_key: Option<&str>) -> Config {
        Config {
            enabled_types: vec!["private_chat".to_string(), "group_chat".to_string()],
            socket: SocketConfig {
                server_url: "http://localhost:9100".to_string(),
                extra_push_auth_key: String::new(),
                path: "/socket.io/".to_string(),
                timeout_secs: 10,
            },
            store: StoreConfig {
                db_path: db_path.to_string(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                api_port: 0,
                api_key: api_key.map(str::to_string),
            },
            expo: ExpoConfig {
                access_token: None,
                timeout_secs: 30,
                max_retries: 3,
                base_delay_ms: 1000,
                default_sound: "default".to_string(),
                default_ttl: 3600,
                default_priority: "normal".to_string(),
                batch_size: 100,
                max_concurrency: 6,
            },
        }
    }

    fn build_app(api_key: Option<&str>) -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path().to_str().unwrap(), api_key);
        let store = Arc::new(Store::open(&config.store.db_path).unwrap());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            DispatcherConfig::default(),
        ));
        let state = ApiState {
            ctx: RelayContext {
                config: Arc::new(config),
                store,
            },
            dispatcher,
            session_connected: Arc::new(AtomicBool::new(false)),
        };
        (dir, build_router(state))
    }

    async fn response_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn set_then_get_user_token() {
        let (_dir, app) = build_app(None);

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/push/set_user_tokens",
                json!({"metaId": "u1", "platform": "expo", "token": "ExponentPushToken[AAA]"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["data"]["message"], "用户令牌设置成功");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/push/get_user_token?metaId=u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["data"]["metaId"], "u1");
        assert_eq!(body["data"]["tokens"]["expo"], "ExponentPushToken[AAA]");
    }

    #[tokio::test]
    async fn missing_meta_id_is_rejected_with_localized_message() {
        let (_dir, app) = build_app(None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/push/get_user_token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response_json(response).await;
        assert_eq!(body["code"], 400);
        assert_eq!(body["message"], "metaId 参数不能为空");
    }

    #[tokio::test]
    async fn incomplete_bodies_are_rejected() {
        let (_dir, app) = build_app(None);

        let response = app
            .oneshot(post_json(
                "/v1/push/add_blocked_chat",
                json!({"metaId": "u1", "chatId": "g1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response_json(response).await;
        assert_eq!(body["message"], "参数错误");
    }

    #[tokio::test]
    async fn api_key_guards_token_registration() {
        let (_dir, app) = build_app(Some("secret-key"));

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/push/set_user_tokens",
                json!({"metaId": "u1", "platform": "expo", "token": "ExponentPushToken[AAA]"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response_json(response).await;
        assert_eq!(body["message"], "认证失败");

        let request = Request::builder()
            .method("POST")
            .uri("/v1/push/set_user_tokens")
            .header("content-type", "application/json")
            .header("X-API-KEY", "secret-key")
            .body(Body::from(
                json!({"metaId": "u1", "platform": "expo", "token": "ExponentPushToken[AAA]"})
                    .to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Reads stay open without the key.
    }

    #[tokio::test]
    async fn blocked_chat_round_trip() {
        let (_dir, app) = build_app(None);

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/push/add_blocked_chat",
                json!({"metaId": "u3", "chatId": "g1", "chatType": "group", "reason": "busy"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/push/get_user_blocked_chats?metaId=u3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = response_json(response).await;
        assert_eq!(body["data"]["blockedChats"][0]["chatId"], "g1");

        let response = app
            .oneshot(post_json(
                "/v1/push/remove_blocked_chat",
                json!({"metaId": "u3", "chatId": "g1"}),
            ))
            .await
            .unwrap();
        let body = response_json(response).await;
        assert_eq!(body["data"]["message"], "屏蔽聊天移除成功");
    }

    #[tokio::test]
    async fn token_list_pagination_defaults() {
        let (_dir, app) = build_app(None);

        for i in 0..3 {
            let response = app
                .clone()
                .oneshot(post_json(
                    "/v1/push/set_user_tokens",
                    json!({
                        "metaId": format!("user-{}", i),
                        "platform": "expo",
                        "token": format!("ExponentPushToken[{:04}]", i),
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/push/get_user_tokens_list")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = response_json(response).await;
        assert_eq!(body["data"]["total"], 3);
        assert_eq!(body["data"]["page"], 1);
        assert_eq!(body["data"]["pageSize"], 10);
        assert_eq!(body["data"]["hasNext"], false);
    }

    #[tokio::test]
    async fn pin_pruning_is_idempotent_and_clear_is_guarded() {
        let (_dir, app) = build_app(Some("secret-key"));

        // Removing a pin that was never recorded still succeeds.
        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/push/remove_notified_pin",
                json!({"pinId": "P404"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Clearing a keyspace is destructive and needs the API key.
        let response = app
            .oneshot(post_json(
                "/v1/push/clear_keyspace",
                json!({"keyspace": "notified_pins"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stats_reports_keyspaces_and_session() {
        let (_dir, app) = build_app(None);

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["data"]["upstreamConnected"], false);
        assert!(body["data"]["keyspaces"].is_array());
    }
}
