//! 请求追踪核心类型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一次请求的 token 用量
///
/// `cache_creation_tokens` 是缓存创建总量（旧版字段，始终有值）；
/// 当上游返回嵌套的 `cache_creation` 对象时，5m/1h 两个分项才会被填充，
/// 且两者之和等于总量。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_creation_5m_tokens: u64,
    pub cache_creation_1h_tokens: u64,
    pub cache_read_tokens: u64,
}

impl TokenUsage {
    /// 是否完全没有用量信息
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.cache_creation_tokens == 0
            && self.cache_read_tokens == 0
    }

    /// 总 token 数（输入 + 输出）
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// 在途请求的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Forwarding,
    Streaming,
    Suspended,
    Completed,
    Failed,
}

impl RequestStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Forwarding => "forwarding",
            Self::Streaming => "streaming",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// 是否为终态
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// 一个在途请求
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRequest {
    pub request_id: String,
    pub client_ip: String,
    pub user_agent: String,
    pub method: String,
    pub path: String,
    pub is_streaming: bool,

    pub status: RequestStatus,
    pub endpoint_name: String,
    pub group_name: String,
    pub retry_count: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    pub model_name: String,
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub total_cost: f64,
}

impl ActiveRequest {
    /// 创建处于 `pending` 状态的新请求
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        client_ip: impl Into<String>,
        user_agent: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        is_streaming: bool,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            client_ip: client_ip.into(),
            user_agent: user_agent.into(),
            method: method.into(),
            path: path.into(),
            is_streaming,
            status: RequestStatus::Pending,
            endpoint_name: String::new(),
            group_name: String::new(),
            retry_count: 0,
            start_time: Utc::now(),
            end_time: None,
            model_name: String::new(),
            usage: TokenUsage::default(),
            total_cost: 0.0,
        }
    }

    /// 请求耗时；未结束时按当前时间计算
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.end_time.unwrap_or_else(Utc::now) - self.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_defaults() {
        let req = ActiveRequest::new(
            "req-test",
            "192.168.1.1",
            "Mozilla/5.0",
            "POST",
            "/v1/messages",
            true,
        );
        assert_eq!(req.request_id, "req-test");
        assert_eq!(req.client_ip, "192.168.1.1");
        assert_eq!(req.status, RequestStatus::Pending);
        assert!(req.is_streaming);
        assert!(req.end_time.is_none());
        assert!(req.usage.is_empty());
    }

    #[test]
    fn status_terminality() {
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(!RequestStatus::Suspended.is_terminal());
        assert_eq!(RequestStatus::Suspended.as_str(), "suspended");
    }
}
