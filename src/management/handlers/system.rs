//! 系统状态接口

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::management::response::display_time;
use crate::management::server::AppState;
use crate::utils::format_uptime;

/// `GET /api/v1/status`
pub async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    let ctx = state.context();
    Json(json!({
        "status": "running",
        "uptime": format_uptime(ctx.uptime()),
        "start_time": display_time(ctx.start_time),
        "config_file": ctx.config_path,
        "version": {
            "version": env!("CARGO_PKG_VERSION"),
            "commit": option_env!("BUILD_COMMIT").unwrap_or("unknown"),
            "date": option_env!("BUILD_DATE").unwrap_or("unknown"),
        },
        "server": {
            "proxy_port": ctx.proxy_port.get().copied().unwrap_or(ctx.config.server.port),
            "web_port": ctx.web_port.get().copied().unwrap_or(ctx.config.web.port),
            "host": ctx.config.server.host,
        },
        "strategy": "priority",
        "auth_enabled": ctx.config.auth.enabled,
        "proxy_enabled": ctx.config.proxy.enabled,
    }))
}

/// `GET /api/v1/ping`
pub async fn ping_handler() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}
