//! # 路由配置
//!
//! 管理 API 的全部路由定义（`/api/v1` 前缀）

use axum::routing::{delete, get, post, put};
use axum::Router;

use super::handlers;
use super::server::AppState;

/// 创建全部管理路由
pub fn create_routes(state: AppState) -> Router {
    let api = Router::new()
        .route("/ping", get(handlers::system::ping_handler))
        .route("/status", get(handlers::system::status_handler))
        .route("/endpoints", get(handlers::endpoints::list_endpoints))
        .route(
            "/endpoints/{name}/priority",
            put(handlers::endpoints::update_priority),
        )
        .route(
            "/endpoints/{name}/health-check",
            post(handlers::endpoints::manual_health_check),
        )
        .route(
            "/endpoints/health-check-all",
            post(handlers::endpoints::batch_health_check_all),
        )
        .route("/endpoints/{name}/keys", get(handlers::keys::endpoint_keys))
        .route(
            "/endpoints/{name}/keys/token",
            post(handlers::keys::switch_token),
        )
        .route(
            "/endpoints/{name}/keys/api-key",
            post(handlers::keys::switch_api_key),
        )
        .route("/keys/overview", get(handlers::keys::keys_overview))
        .route("/groups/details", get(handlers::groups::group_details))
        .route(
            "/groups/{name}/activate",
            post(handlers::groups::activate_group),
        )
        .route("/groups/{name}/pause", post(handlers::groups::pause_group))
        .route("/groups/{name}/resume", post(handlers::groups::resume_group))
        .route("/connections", get(handlers::connections::connections))
        .route("/requests", get(handlers::connections::active_requests))
        .route("/logs", get(handlers::logs::recent_logs))
        .route(
            "/pricing",
            get(handlers::pricing::list_pricing).post(handlers::pricing::create_pricing),
        )
        .route(
            "/pricing/{model}",
            put(handlers::pricing::update_pricing).delete(handlers::pricing::delete_pricing),
        )
        .route(
            "/pricing/{model}/set-default",
            post(handlers::pricing::set_default_pricing),
        );

    Router::new().nest("/api/v1", api).with_state(state)
}
