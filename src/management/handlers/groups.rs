//! 组激活与暂停接口

use axum::extract::{Path, State};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::management::response::{display_now, ApiError};
use crate::management::server::AppState;

/// 解析可省略的 JSON 请求体；空体取默认值，非法 JSON 返回 400
fn parse_optional_body<T: Default + for<'de> Deserialize<'de>>(
    body: &Bytes,
) -> Result<T, ApiError> {
    if body.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|_| ProxyError::validation("无效的请求参数").into())
}

/// `GET /api/v1/groups/details`
pub async fn group_details(State(state): State<AppState>) -> Json<Value> {
    let ctx = state.context();
    let details = ctx.endpoint_manager.group_manager().get_group_details();
    let active_count = details.iter().filter(|d| d.is_active).count();
    let total = details.len();

    Json(json!({
        "groups": details,
        "total": total,
        "active_count": active_count,
        "timestamp": display_now(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivateGroupRequest {
    #[serde(default)]
    force: bool,
}

/// `POST /api/v1/groups/:name/activate`
pub async fn activate_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let force = parse_optional_body::<ActivateGroupRequest>(&body)?.force;

    let ctx = state.context();
    ctx.endpoint_manager
        .group_manager()
        .manual_activate_group_with_force(&name, force)?;

    Ok(Json(json!({
        "success": true,
        "message": if force { "组已强制激活" } else { "组已激活" },
        "group": name,
        "force": force,
        "timestamp": display_now(),
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct PauseGroupRequest {
    #[serde(default)]
    duration_seconds: u64,
}

/// `POST /api/v1/groups/:name/pause`
pub async fn pause_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let duration_seconds = parse_optional_body::<PauseGroupRequest>(&body)?.duration_seconds;

    let ctx = state.context();
    ctx.endpoint_manager
        .group_manager()
        .manual_pause_group(&name, duration_seconds)?;

    Ok(Json(json!({
        "success": true,
        "message": "组已暂停",
        "group": name,
        "duration_seconds": duration_seconds,
        "timestamp": display_now(),
    })))
}

/// `POST /api/v1/groups/:name/resume`
pub async fn resume_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let ctx = state.context();
    ctx.endpoint_manager
        .group_manager()
        .manual_resume_group(&name)?;

    Ok(Json(json!({
        "success": true,
        "message": "组已恢复",
        "group": name,
        "timestamp": display_now(),
    })))
}
