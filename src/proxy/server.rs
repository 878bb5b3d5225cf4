//! # 转发服务器
//!
//! Axum 入口：接收 Anthropic 兼容的客户端请求，交给调度器处理。
//! 字节流原样回写，转发层不改动请求与响应内容。

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::dispatcher::{Dispatcher, InboundRequest};
use crate::config::ServerConfig;
use crate::error::{ProxyError, Result};
use crate::utils::port::find_available_port;

/// 转发服务器共享状态
#[derive(Clone)]
pub struct ProxyState {
    dispatcher: Arc<Dispatcher>,
}

/// 生成 `req-` 前缀的短请求 ID
#[must_use]
pub fn generate_request_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("req-{}", &id[..8])
}

/// 构建转发路由：所有路径全部进入调度器
pub fn proxy_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .fallback(forward_handler)
        .with_state(ProxyState { dispatcher })
}

async fn forward_handler(
    State(state): State<ProxyState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();

    let client_ip = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map_or_else(|| peer.ip().to_string(), |ip| ip.trim().to_string());
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);

    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!("读取请求体失败: {err}");
            bytes::Bytes::new()
        }
    };

    let inbound = InboundRequest {
        request_id: generate_request_id(),
        client_ip,
        user_agent,
        method: parts.method,
        path_and_query,
        headers: parts.headers,
        body,
    };

    tracing::debug!(
        "[{}] {} {} 进入调度",
        inbound.request_id,
        inbound.method,
        inbound.path_and_query
    );
    state.dispatcher.dispatch(inbound).await
}

/// 启动转发服务器（端口占用时自动向后探测）
pub async fn serve_proxy(
    config: &ServerConfig,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) -> Result<u16> {
    let port = find_available_port(config.port, config.port_probe_attempts)?;
    let addr: SocketAddr = format!("{}:{port}", config.host)
        .parse()
        .map_err(|e| ProxyError::server_init(format!("监听地址无效: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ProxyError::internal_with_source("转发端口绑定失败", e))?;

    tracing::info!("🚀 转发服务器监听 {addr}");

    let router = proxy_router(dispatcher);
    tokio::spawn(async move {
        let result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await;
        if let Err(err) = result {
            tracing::error!("转发服务器退出: {err}");
        }
    });

    Ok(port)
}
