use axum::{
    extract::{Extension, Query},
    response::{Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::respond::{error, invalid_params, success};
use crate::ApiState;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "relay-api"
    }))
}

/// Keyspace sizes, registered providers and session state, for operators.
pub async fn stats(Extension(state): Extension<ApiState>) -> Response {
    let started = Instant::now();

    match state.ctx.store.keyspace_stats().await {
        Ok(keyspaces) => success(
            json!({
                "keyspaces": keyspaces,
                "providers": state.dispatcher.provider_names(),
                "upstreamConnected": state.session_connected.load(Ordering::SeqCst),
            }),
            started,
        ),
        Err(e) => error(&e, started),
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoveNotifiedPinReq {
    #[serde(rename = "pinId", default)]
    pub pin_id: String,
}

/// Prunes one dedup record so the next envelope for this pin fans out again.
pub async fn remove_notified_pin(
    Extension(state): Extension<ApiState>,
    Json(req): Json<RemoveNotifiedPinReq>,
) -> Response {
    let started = Instant::now();
    if req.pin_id.is_empty() {
        return invalid_params(started);
    }

    match state.ctx.store.remove_notified_pin(&req.pin_id).await {
        Ok(()) => success(
            json!({
                "success": true,
                "message": "PIN通知记录移除成功",
            }),
            started,
        ),
        Err(e) => error(&e, started),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClearKeyspaceReq {
    #[serde(default)]
    pub keyspace: String,
}

/// Empties one keyspace. Destructive; sits behind the API key.
pub async fn clear_keyspace(
    Extension(state): Extension<ApiState>,
    Json(req): Json<ClearKeyspaceReq>,
) -> Response {
    let started = Instant::now();
    if req.keyspace.is_empty() {
        return invalid_params(started);
    }

    match state.ctx.store.clear_keyspace(&req.keyspace).await {
        Ok(removed) => success(
            json!({
                "success": true,
                "removed": removed,
            }),
            started,
        ),
        Err(e) => error(&e, started),
    }
}

/// Best-effort connectivity probe across every registered provider.
pub async fn provider_health(Extension(state): Extension<ApiState>) -> Response {
    let started = Instant::now();
    let health = state.dispatcher.health().await;
    let report: serde_json::Map<String, serde_json::Value> = health
        .into_iter()
        .map(|(name, error)| {
            (
                name,
                match error {
                    None => json!({"healthy": true}),
                    Some(message) => json!({"healthy": false, "error": message}),
                },
            )
        })
        .collect();
    success(serde_json::Value::Object(report), started)
}

#[derive(Debug, Deserialize)]
pub struct CheckReceiptsReq {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Fetches delivery receipts for previously returned ticket ids. Tokens the
/// gateway reports as unregistered are only surfaced here; pruning them is
/// an operator decision.
pub async fn check_receipts(
    Extension(state): Extension<ApiState>,
    Json(req): Json<CheckReceiptsReq>,
) -> Response {
    let started = Instant::now();
    if req.platform.is_empty() || req.ids.is_empty() {
        return invalid_params(started);
    }

    match state.dispatcher.check_receipts(&req.platform, &req.ids).await {
        Ok(receipts) => success(receipts, started),
        Err(e) => error(&e, started),
    }
}

#[derive(Debug, Deserialize)]
pub struct SetUserTokensReq {
    #[serde(rename = "metaId", default)]
    pub meta_id: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub token: String,
}

pub async fn set_user_tokens(
    Extension(state): Extension<ApiState>,
    Json(req): Json<SetUserTokensReq>,
) -> Response {
    let started = Instant::now();
    if req.meta_id.is_empty() || req.platform.is_empty() || req.token.is_empty() {
        return invalid_params(started);
    }

    match state
        .ctx
        .store
        .set_user_token(&req.meta_id, &req.platform, &req.token)
        .await
    {
        Ok(()) => success(
            json!({
                "success": true,
                "message": "用户令牌设置成功",
            }),
            started,
        ),
        Err(e) => error(&e, started),
    }
}

#[derive(Debug, Deserialize)]
pub struct MetaIdQuery {
    #[serde(rename = "metaId", default)]
    pub meta_id: String,
}

pub async fn get_user_token(
    Extension(state): Extension<ApiState>,
    Query(params): Query<MetaIdQuery>,
) -> Response {
    let started = Instant::now();
    if params.meta_id.is_empty() {
        return crate::respond::error_with(
            axum::http::StatusCode::BAD_REQUEST,
            "metaId 参数不能为空",
            started,
        );
    }

    match state.ctx.store.get_user_tokens(&params.meta_id).await {
        Ok(tokens) => success(tokens, started),
        Err(e) => error(&e, started),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(rename = "pageSize", default)]
    pub page_size: Option<usize>,
}

pub async fn get_user_tokens_list(
    Extension(state): Extension<ApiState>,
    Query(params): Query<ListQuery>,
) -> Response {
    let started = Instant::now();
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(10);

    match state.ctx.store.list_user_tokens(page, page_size).await {
        Ok(result) => success(result, started),
        Err(e) => error(&e, started),
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoveUserTokenReq {
    #[serde(rename = "metaId", default)]
    pub meta_id: String,
    #[serde(default)]
    pub platform: String,
}

pub async fn remove_user_token(
    Extension(state): Extension<ApiState>,
    Json(req): Json<RemoveUserTokenReq>,
) -> Response {
    let started = Instant::now();
    if req.meta_id.is_empty() || req.platform.is_empty() {
        return invalid_params(started);
    }

    match state
        .ctx
        .store
        .remove_user_token(&req.meta_id, &req.platform)
        .await
    {
        Ok(()) => success(
            json!({
                "success": true,
                "message": "用户令牌移除成功",
            }),
            started,
        ),
        Err(e) => error(&e, started),
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoveUserAllTokensReq {
    #[serde(rename = "metaId", default)]
    pub meta_id: String,
}

pub async fn remove_user_all_tokens(
    Extension(state): Extension<ApiState>,
    Json(req): Json<RemoveUserAllTokensReq>,
) -> Response {
    let started = Instant::now();
    if req.meta_id.is_empty() {
        return invalid_params(started);
    }

    match state.ctx.store.delete_user_tokens(&req.meta_id).await {
        Ok(()) => success(
            json!({
                "success": true,
                "message": "用户所有令牌移除成功",
            }),
            started,
        ),
        Err(e) => error(&e, started),
    }
}

pub async fn get_user_blocked_chats(
    Extension(state): Extension<ApiState>,
    Query(params): Query<MetaIdQuery>,
) -> Response {
    let started = Instant::now();
    if params.meta_id.is_empty() {
        return crate::respond::error_with(
            axum::http::StatusCode::BAD_REQUEST,
            "metaId 参数不能为空",
            started,
        );
    }

    match state
        .ctx
        .store
        .get_user_blocked_chats(&params.meta_id)
        .await
    {
        Ok(chats) => success(chats, started),
        Err(e) => error(&e, started),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddBlockedChatReq {
    #[serde(rename = "metaId", default)]
    pub meta_id: String,
    #[serde(rename = "chatId", default)]
    pub chat_id: String,
    #[serde(rename = "chatType", default)]
    pub chat_type: String,
    #[serde(default)]
    pub reason: String,
}

pub async fn add_blocked_chat(
    Extension(state): Extension<ApiState>,
    Json(req): Json<AddBlockedChatReq>,
) -> Response {
    let started = Instant::now();
    if req.meta_id.is_empty() || req.chat_id.is_empty() || req.chat_type.is_empty() {
        return invalid_params(started);
    }

    match state
        .ctx
        .store
        .add_blocked_chat(&req.meta_id, &req.chat_id, &req.chat_type, &req.reason)
        .await
    {
        Ok(()) => success(
            json!({
                "success": true,
                "message": "屏蔽聊天添加成功",
                "data": {
                    "metaId": req.meta_id,
                    "chatId": req.chat_id,
                    "chatType": req.chat_type,
                    "reason": req.reason,
                },
            }),
            started,
        ),
        Err(e) => error(&e, started),
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoveBlockedChatReq {
    #[serde(rename = "metaId", default)]
    pub meta_id: String,
    #[serde(rename = "chatId", default)]
    pub chat_id: String,
}

pub async fn remove_blocked_chat(
    Extension(state): Extension<ApiState>,
    Json(req): Json<RemoveBlockedChatReq>,
) -> Response {
    let started = Instant::now();
    if req.meta_id.is_empty() || req.chat_id.is_empty() {
        return invalid_params(started);
    }

    match state
        .ctx
        .store
        .remove_blocked_chat(&req.meta_id, &req.chat_id)
        .await
    {
        Ok(()) => success(
            json!({
                "success": true,
                "message": "屏蔽聊天移除成功",
                "data": {
                    "metaId": req.meta_id,
                    "chatId": req.chat_id,
                },
            }),
            started,
        ),
        Err(e) => error(&e, started),
    }
}
