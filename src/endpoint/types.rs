//! 端点目录核心类型

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::EndpointConfig;

/// 端点健康状态（与配置分离的运行期数据）
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub response_time: Duration,
    pub never_checked: bool,
    pub consecutive_failures: u32,
    pub error: Option<String>,
}

impl Default for EndpointStatus {
    fn default() -> Self {
        Self {
            healthy: false,
            last_check: None,
            response_time: Duration::ZERO,
            never_checked: true,
            consecutive_failures: 0,
            error: None,
        }
    }
}

/// 目录中的一个端点：静态配置 + 运行期状态
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub config: EndpointConfig,
    pub status: EndpointStatus,
}

impl Endpoint {
    #[must_use]
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            status: EndpointStatus::default(),
        }
    }

    /// 调度时是否可作为优先候选：已知健康或尚未检查过
    #[must_use]
    pub fn usable(&self) -> bool {
        self.status.healthy || self.status.never_checked
    }
}

/// 上游请求使用的凭证
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// `Authorization: Bearer …`
    Bearer(String),
    /// `x-api-key: …`
    ApiKey(String),
}

/// 端点凭证状态的脱敏视图（管理接口返回体）
#[derive(Debug, Clone, Serialize)]
pub struct EndpointKeysInfo {
    pub endpoint: String,
    pub url: String,
    pub token_count: usize,
    pub api_key_count: usize,
    pub active_token_index: usize,
    pub active_api_key_index: usize,
    /// 脱敏后的 Token 列表
    pub tokens: Vec<String>,
    /// 脱敏后的 API Key 列表
    pub api_keys: Vec<String>,
    pub has_multiple_tokens: bool,
    pub last_switch_time: Option<String>,
}
