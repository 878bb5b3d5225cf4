//! # 管理 API 响应辅助
//!
//! 错误统一为 `{"error": "…"}` 加相应状态码；成功响应由各 handler
//! 按接口契约自行构造。

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::ProxyError;

/// 把 `ProxyError` 映射为管理 API 的错误响应
pub struct ApiError(pub ProxyError);

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!("管理接口错误: {}", self.0);
        } else {
            tracing::warn!("管理接口拒绝请求: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// 当前时间的展示格式（与仪表盘约定一致）
#[must_use]
pub fn display_now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// 时间戳的展示格式
#[must_use]
pub fn display_time(time: chrono::DateTime<chrono::Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}
