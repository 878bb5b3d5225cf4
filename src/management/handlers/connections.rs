//! 连接与挂起请求指标接口

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::management::response::display_time;
use crate::management::server::AppState;
use crate::utils::format_response_time;

/// `GET /api/v1/connections`
pub async fn connections(State(state): State<AppState>) -> Json<Value> {
    let ctx = state.context();
    let snapshot = ctx.monitoring.get_metrics();
    let suspended_stats = ctx.monitoring.get_suspended_stats();

    let suspended_connections: Vec<Value> = ctx
        .monitoring
        .get_active_suspended_connections()
        .iter()
        .map(|conn| {
            let suspended_for = (Utc::now() - conn.suspended_at)
                .to_std()
                .unwrap_or_default();
            json!({
                "id": conn.id,
                "client_ip": conn.client_ip,
                "method": conn.method,
                "path": conn.path,
                "endpoint": conn.endpoint,
                "suspended_at": display_time(conn.suspended_at),
                "suspended_time": format_response_time(suspended_for),
                "retry_count": conn.retry_count,
                "user_agent": conn.user_agent,
            })
        })
        .collect();

    Json(json!({
        "total_requests": snapshot.total_requests,
        "active_connections": ctx.hot_pool.get_active_count(),
        "successful_requests": snapshot.successful_requests,
        "failed_requests": snapshot.failed_requests,
        "average_response_time": format!("{}ms", snapshot.average_response_time_ms),
        "requests_per_endpoint": snapshot.requests_per_endpoint,
        "errors_per_endpoint": snapshot.errors_per_endpoint,
        "suspended": suspended_stats,
        "suspended_connections": suspended_connections,
    }))
}

/// `GET /api/v1/requests` — 热池中的在途请求与运行统计
pub async fn active_requests(State(state): State<AppState>) -> Json<Value> {
    let ctx = state.context();
    let requests = ctx.hot_pool.list_active();
    let total = requests.len();
    let stats = ctx.hot_pool.get_stats();

    Json(json!({
        "requests": requests,
        "total": total,
        "stats": stats,
    }))
}
