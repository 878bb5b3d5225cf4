//! 端点凭证管理接口

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::management::response::{display_now, ApiError};
use crate::management::server::AppState;

/// `GET /api/v1/endpoints/:name/keys`
pub async fn endpoint_keys(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let ctx = state.context();
    match ctx.endpoint_manager.get_endpoint_keys_info(&name) {
        Some(info) => Json(info).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "端点未找到" })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SwitchKeyRequest {
    index: i64,
}

/// `POST /api/v1/endpoints/:name/keys/token`
pub async fn switch_token(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SwitchKeyRequest>,
) -> Result<Json<Value>, ApiError> {
    let index = validate_index(request.index)?;

    let ctx = state.context();
    ctx.endpoint_manager.switch_endpoint_token(&name, index)?;

    tracing::info!("🔑 Token已通过管理接口切换: {name} -> {index}");
    Ok(Json(json!({
        "success": true,
        "message": "Token 切换成功",
        "endpoint": name,
        "new_index": index,
        "timestamp": display_now(),
    })))
}

/// `POST /api/v1/endpoints/:name/keys/api-key`
pub async fn switch_api_key(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SwitchKeyRequest>,
) -> Result<Json<Value>, ApiError> {
    let index = validate_index(request.index)?;

    let ctx = state.context();
    ctx.endpoint_manager.switch_endpoint_api_key(&name, index)?;

    tracing::info!("🔑 API Key已通过管理接口切换: {name} -> {index}");
    Ok(Json(json!({
        "success": true,
        "message": "API Key 切换成功",
        "endpoint": name,
        "new_index": index,
        "timestamp": display_now(),
    })))
}

/// `GET /api/v1/keys/overview`
pub async fn keys_overview(State(state): State<AppState>) -> Json<Value> {
    let ctx = state.context();
    let overview = ctx.endpoint_manager.keys_overview();
    let total = overview.len();

    Json(json!({
        "endpoints": overview,
        "total": total,
        "timestamp": display_now(),
    }))
}

fn validate_index(index: i64) -> Result<usize, ApiError> {
    usize::try_from(index)
        .map_err(|_| crate::error::ProxyError::validation_field("无效的请求参数", "index").into())
}
