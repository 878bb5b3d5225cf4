//! # 管理服务器
//!
//! Axum HTTP 服务器，提供管理与监控 API

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes::create_routes;
use crate::app::AppContext;
use crate::config::WebConfig;
use crate::error::{ProxyError, Result};
use crate::utils::port::find_available_port;

/// 管理服务器共享状态
#[derive(Clone)]
pub struct AppState {
    context: Arc<AppContext>,
}

impl AppState {
    #[must_use]
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }
}

/// 启动管理服务器（端口占用时自动向后探测）
pub async fn serve_management(
    config: &WebConfig,
    context: Arc<AppContext>,
    cancel: CancellationToken,
) -> Result<u16> {
    let port = find_available_port(config.port, config.port_probe_attempts)?;
    let addr: SocketAddr = format!("{}:{port}", config.host)
        .parse()
        .map_err(|e| ProxyError::server_init(format!("管理监听地址无效: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ProxyError::internal_with_source("管理端口绑定失败", e))?;

    let mut router = create_routes(AppState::new(context)).layer(TraceLayer::new_for_http());
    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    tracing::info!("🌐 管理服务器监听 {addr}");

    tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await;
        if let Err(err) = result {
            tracing::error!("管理服务器退出: {err}");
        }
    });

    Ok(port)
}
