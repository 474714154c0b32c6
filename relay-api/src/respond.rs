use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use std::time::Instant;

use relay_core::RelayError;

pub const CODE_SUCCESS: u16 = 0;

/// Unified management-API envelope: `{code, message, processingTime, data}`.
/// `code` is 0 on success and mirrors the HTTP status on errors.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub message: String,
    #[serde(rename = "processingTime")]
    pub processing_time_ms: u128,
    pub data: Option<T>,
}

pub fn success<T: Serialize>(data: T, started: Instant) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse {
            code: CODE_SUCCESS,
            message: "success".to_string(),
            processing_time_ms: started.elapsed().as_millis(),
            data: Some(data),
        }),
    )
        .into_response()
}

/// Bad-request rejection with the localized parameter message.
pub fn invalid_params(started: Instant) -> Response {
    error_with(StatusCode::BAD_REQUEST, "参数错误", started)
}

pub fn error_with(status: StatusCode, message: &str, started: Instant) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            code: status.as_u16(),
            message: message.to_string(),
            processing_time_ms: started.elapsed().as_millis(),
            data: None,
        }),
    )
        .into_response()
}

/// Maps each error kind to its HTTP status and localized message.
pub fn error(err: &RelayError, started: Instant) -> Response {
    let (status, message) = match err {
        RelayError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "参数错误".to_string()),
        RelayError::StoreUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "存储服务不可用".to_string(),
        ),
        RelayError::NotConnected(_) => (StatusCode::BAD_GATEWAY, "服务未连接".to_string()),
        RelayError::InvalidToken(_) => (StatusCode::BAD_REQUEST, "推送令牌无效".to_string()),
        RelayError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "请求超时".to_string()),
        RelayError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "请求已取消".to_string()),
        RelayError::ProviderTransport(_) | RelayError::ProviderReject(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "服务器内部错误".to_string(),
        ),
    };
    tracing::debug!("management API error: {}", err);
    error_with(status, &message, started)
}
