//! 端点目录与健康检查接口

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::management::response::{display_now, display_time, ApiError};
use crate::management::server::AppState;
use crate::utils::format_response_time;

/// `GET /api/v1/endpoints`
pub async fn list_endpoints(State(state): State<AppState>) -> Json<Value> {
    let ctx = state.context();
    let manager = &ctx.endpoint_manager;

    let active_groups: Vec<String> = manager
        .group_manager()
        .get_active_groups()
        .into_iter()
        .map(|g| g.name)
        .collect();

    let endpoints: Vec<Value> = manager
        .get_endpoints()
        .iter()
        .map(|ep| {
            json!({
                "name": ep.config.name,
                "url": ep.config.url,
                "priority": ep.config.priority,
                // 一端点一组：组名即端点名
                "group": ep.config.name,
                "group_priority": ep.config.group_priority,
                "group_is_active": active_groups.contains(&ep.config.name),
                "timeout": format!("{}s", ep.config.timeout_secs),
                "healthy": ep.status.healthy,
                "last_check": ep.status.last_check.map(display_time).unwrap_or_else(|| "从未检查".to_string()),
                "response_time": format_response_time(ep.status.response_time),
                "never_checked": ep.status.never_checked,
                "error": ep.status.error.clone().unwrap_or_default(),
            })
        })
        .collect();

    Json(json!({
        "endpoints": endpoints,
        "total": endpoints.len(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriorityRequest {
    priority: i64,
}

/// `PUT /api/v1/endpoints/:name/priority`
pub async fn update_priority(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<UpdatePriorityRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.priority < 1 {
        return Err(ProxyError::validation_field("优先级必须 >= 1", "priority").into());
    }

    let ctx = state.context();
    ctx.endpoint_manager
        .update_endpoint_priority(&name, request.priority as u32)?;

    tracing::info!("🔄 端点优先级已通过管理接口更新: {name} -> {}", request.priority);
    Ok(Json(json!({
        "success": true,
        "message": "优先级更新成功",
    })))
}

/// `POST /api/v1/endpoints/:name/health-check`
pub async fn manual_health_check(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let ctx = state.context();
    let status = ctx.endpoint_manager.manual_health_check(&name).await?;

    tracing::info!("🔍 手动健康检测已完成: {name} healthy={}", status.healthy);
    Ok(Json(json!({
        "success": true,
        "message": "手动健康检测完成",
        "healthy": status.healthy,
        "response_time": format_response_time(status.response_time),
        "last_check": status.last_check.map(display_time).unwrap_or_default(),
        "never_checked": status.never_checked,
    })))
}

/// `POST /api/v1/endpoints/health-check-all`
pub async fn batch_health_check_all(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    tracing::info!("🔍 [批量健康检测] 收到批量检测请求");

    let ctx = state.context();
    let (healthy_count, unhealthy_count) = ctx.endpoint_manager.batch_health_check_all().await?;
    let total = healthy_count + unhealthy_count;

    tracing::info!(
        "✅ [批量健康检测] 所有端点检测完成: total={total}, healthy={healthy_count}, unhealthy={unhealthy_count}"
    );
    Ok(Json(json!({
        "success": true,
        "message": "批量健康检测完成",
        "total": total,
        "healthy_count": healthy_count,
        "unhealthy_count": unhealthy_count,
        "timestamp": display_now(),
    })))
}
