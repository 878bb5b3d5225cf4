//! # 错误类型定义

use axum::http::StatusCode;
use thiserror::Error;

/// 错误归属：客户端问题还是服务端问题（决定日志级别）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Client,
    Server,
}

/// 应用主要错误类型
#[derive(Debug, Error)]
pub enum ProxyError {
    /// 配置相关错误
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 管理接口参数校验错误
    #[error("参数校验错误: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// 资源未找到（端点/组/定价）
    #[error("{resource_type}不存在: {identifier}")]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    /// 资源冲突（重复创建、越界索引、删除默认定价）
    #[error("资源冲突: {message}")]
    Conflict { message: String },

    /// 状态不允许（冷却中、强制激活前置条件不满足）
    #[error("{message}")]
    State { message: String },

    /// 上游暂时性失败（连接错误、超时、5xx、overloaded）
    #[error("上游暂时性错误: {message}")]
    UpstreamTransient {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 上游凭证失效（401/403）
    #[error("上游认证错误: {message}")]
    UpstreamAuth { message: String, status: u16 },

    /// 上游确定性失败（非认证类 4xx，原样透传给客户端）
    #[error("上游错误响应: HTTP {status}")]
    UpstreamFatal { status: u16, body: bytes::Bytes },

    /// 活跃请求池已满
    #[error("活跃请求池已满: {message}")]
    Overflow { message: String },

    /// 挂起请求等待超时
    #[error("请求挂起超时: {message}")]
    SuspendTimeout {
        message: String,
        last_endpoint: Option<String>,
    },

    /// 网络通信错误
    #[error("网络错误: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 健康检查错误
    #[error("健康检查错误: {message}")]
    HealthCheck {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 服务器初始化错误
    #[error("服务器初始化错误: {message}")]
    ServerInit {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl ProxyError {
    /// 错误对应的 HTTP 状态码
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config { .. } | Self::Validation { .. } | Self::State { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::UpstreamTransient { .. } | Self::Network { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamAuth { .. } => StatusCode::UNAUTHORIZED,
            Self::UpstreamFatal { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Overflow { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::SuspendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::HealthCheck { .. } | Self::ServerInit { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 机器可读的错误码
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "RESOURCE_NOT_FOUND",
            Self::Conflict { .. } => "RESOURCE_CONFLICT",
            Self::State { .. } => "STATE_ERROR",
            Self::UpstreamTransient { .. } => "UPSTREAM_TRANSIENT",
            Self::UpstreamAuth { .. } => "UPSTREAM_AUTH_ERROR",
            Self::UpstreamFatal { .. } => "UPSTREAM_ERROR",
            Self::Overflow { .. } => "POOL_OVERFLOW",
            Self::SuspendTimeout { .. } => "SUSPEND_TIMEOUT",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::HealthCheck { .. } => "HEALTH_CHECK_ERROR",
            Self::ServerInit { .. } => "SERVER_INIT_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// 错误归属分类
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. }
            | Self::Validation { .. }
            | Self::NotFound { .. }
            | Self::Conflict { .. }
            | Self::State { .. }
            | Self::Overflow { .. }
            | Self::UpstreamAuth { .. }
            | Self::UpstreamFatal { .. } => ErrorCategory::Client,
            Self::UpstreamTransient { .. }
            | Self::SuspendTimeout { .. }
            | Self::Network { .. }
            | Self::HealthCheck { .. }
            | Self::ServerInit { .. }
            | Self::Internal { .. } => ErrorCategory::Server,
        }
    }

    /// 暂时性失败：重试/转移后仍可能成功
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTransient { .. } | Self::Network { .. }
        )
    }

    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field<T: Into<String>, F: Into<String>>(message: T, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn not_found<T: Into<String>, I: Into<String>>(resource_type: T, identifier: I) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }

    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn state<T: Into<String>>(message: T) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    pub fn upstream_transient<T: Into<String>>(message: T) -> Self {
        Self::UpstreamTransient {
            message: message.into(),
            source: None,
        }
    }

    pub fn upstream_transient_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::UpstreamTransient {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn upstream_auth<T: Into<String>>(message: T, status: u16) -> Self {
        Self::UpstreamAuth {
            message: message.into(),
            status,
        }
    }

    pub fn overflow<T: Into<String>>(message: T) -> Self {
        Self::Overflow {
            message: message.into(),
        }
    }

    pub fn suspend_timeout<T: Into<String>>(message: T, last_endpoint: Option<String>) -> Self {
        Self::SuspendTimeout {
            message: message.into(),
            last_endpoint,
        }
    }

    pub fn network<T: Into<String>>(message: T) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    pub fn network_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn health_check<T: Into<String>>(message: T) -> Self {
        Self::HealthCheck {
            message: message.into(),
            source: None,
        }
    }

    pub fn server_init<T: Into<String>>(message: T) -> Self {
        Self::ServerInit {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            ProxyError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::not_found("端点", "x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProxyError::overflow("full").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::suspend_timeout("t", None).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProxyError::upstream_transient("reset").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn upstream_fatal_keeps_original_status() {
        let err = ProxyError::UpstreamFatal {
            status: 422,
            body: bytes::Bytes::from_static(b"{}"),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn not_found_message_names_resource() {
        let err = ProxyError::not_found("组", "main");
        assert!(err.to_string().contains("组不存在"));
        assert!(err.to_string().contains("main"));
    }

    #[test]
    fn retriable_classification() {
        assert!(ProxyError::upstream_transient("x").is_retriable());
        assert!(!ProxyError::upstream_auth("x", 401).is_retriable());
        assert!(!ProxyError::overflow("x").is_retriable());
    }
}
