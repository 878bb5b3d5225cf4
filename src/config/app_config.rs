//! # 应用配置结构定义

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tracking::{EndpointMultiplier, ModelPricing};

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 转发服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 管理（Web）服务器配置
    #[serde(default)]
    pub web: WebConfig,
    /// 失败重试配置
    #[serde(default)]
    pub retry: RetryConfig,
    /// 健康检查配置
    #[serde(default)]
    pub health: HealthConfig,
    /// 组切换配置
    #[serde(default)]
    pub group: GroupConfig,
    /// 请求挂起配置
    #[serde(default)]
    pub request_suspend: RequestSuspendConfig,
    /// 活跃请求热池配置
    #[serde(default)]
    pub hot_pool: HotPoolSettings,
    /// 认证开关（管理面）
    #[serde(default)]
    pub auth: AuthConfig,
    /// 出站代理开关
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// 模型定价表（模型名 → 每百万 token 价格）
    #[serde(default)]
    pub model_pricing: HashMap<String, ModelPricing>,
    /// 未知模型的默认定价
    #[serde(default)]
    pub default_pricing: Option<ModelPricing>,
    /// 上游端点列表
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// 转发服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 端口被占用时向后探测的最大次数
    #[serde(default = "default_port_attempts")]
    pub port_probe_attempts: u16,
    /// 全局请求超时（秒）
    #[serde(default = "default_global_timeout")]
    pub global_timeout_secs: u64,
    /// 工作线程数
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8087,
            port_probe_attempts: default_port_attempts(),
            global_timeout_secs: default_global_timeout(),
            workers: default_workers(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub const fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout_secs)
    }
}

/// 管理服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_port_attempts")]
    pub port_probe_attempts: u16,
    /// 是否启用 CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8088,
            port_probe_attempts: default_port_attempts(),
            enable_cors: true,
        }
    }
}

/// 失败重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 单端点最大尝试次数
    pub max_attempts: u32,
    /// 首次退避（毫秒）
    pub base_delay_ms: u64,
    /// 退避上限（毫秒）
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// 健康检查配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// 检查间隔（秒）
    pub interval_secs: u64,
    /// 单次探测超时（秒）
    pub timeout_secs: u64,
    /// 探测路径
    pub path: String,
    /// 连续失败多少次判定为不健康
    pub failure_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 10,
            path: "/v1/models".to_string(),
            failure_threshold: 3,
        }
    }
}

impl HealthConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 组切换配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// 自动下线后的冷却时长（秒）
    pub cooldown_secs: u64,
    /// 是否允许多组同时活跃
    #[serde(default)]
    pub allow_multiple_active: bool,
    /// 组内端点全部失败时是否自动切换到下一组
    #[serde(default = "default_true")]
    pub auto_switch_between_groups: bool,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 600,
            allow_multiple_active: false,
            auto_switch_between_groups: true,
        }
    }
}

impl GroupConfig {
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// 请求挂起配置：所有组都不可用时把请求挂起等待恢复
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSuspendConfig {
    pub enabled: bool,
    /// 挂起等待上限（秒）
    pub timeout_secs: u64,
}

impl Default for RequestSuspendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 300,
        }
    }
}

impl RequestSuspendConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 活跃请求热池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotPoolSettings {
    pub max_age_secs: u64,
    pub max_size: usize,
    pub cleanup_interval_secs: u64,
}

impl Default for HotPoolSettings {
    fn default() -> Self {
        Self {
            max_age_secs: 1800,
            max_size: 1000,
            cleanup_interval_secs: 60,
        }
    }
}

/// 管理面认证开关（认证中间件本体由外部装配）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// 出站代理开关
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// 上游端点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// 端点名（唯一）
    pub name: String,
    /// 上游基址，如 `https://api.anthropic.com`
    pub url: String,
    /// 组内优先级（1 为最高）
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// 组优先级（1 为最高）
    #[serde(default = "default_priority")]
    pub group_priority: u32,
    /// 单请求超时（秒）
    #[serde(default = "default_endpoint_timeout")]
    pub timeout_secs: u64,
    /// Bearer Token 列表
    #[serde(default)]
    pub tokens: Vec<String>,
    /// API Key 列表
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// 费用倍率
    #[serde(default)]
    pub multiplier: Option<EndpointMultiplier>,
}

impl EndpointConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_priority() -> u32 {
    1
}

fn default_endpoint_timeout() -> u64 {
    300
}

fn default_port_attempts() -> u16 {
    10
}

fn default_global_timeout() -> u64 {
    600
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_true() -> bool {
    true
}
