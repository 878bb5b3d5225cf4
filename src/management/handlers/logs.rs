//! 历史日志查询接口

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::management::response::display_now;
use crate::management::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    limit: usize,
}

/// `GET /api/v1/logs?limit=N` — 环形缓冲区中的最近日志
pub async fn recent_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<Value> {
    let ctx = state.context();
    let logs = ctx
        .broadcast
        .as_ref()
        .map(|handler| handler.get_recent_logs(query.limit))
        .unwrap_or_default();
    let total = logs.len();

    Json(json!({
        "logs": logs,
        "total": total,
        "timestamp": display_now(),
    }))
}
