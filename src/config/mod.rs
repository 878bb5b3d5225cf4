//! # 配置管理模块
//!
//! 处理应用配置加载与校验

mod app_config;

pub use app_config::{
    AppConfig, AuthConfig, EndpointConfig, GroupConfig, HealthConfig, HotPoolSettings,
    ProxyConfig, RequestSuspendConfig, RetryConfig, ServerConfig, WebConfig,
};

use std::collections::HashSet;
use std::path::Path;

use crate::error::{ErrorContext, ProxyError, Result};

/// 从 TOML 文件加载配置并校验
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Err(ProxyError::config(format!(
            "配置文件不存在: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)
        .with_config_context(|| format!("读取配置文件失败: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content)
        .with_config_context(|| format!("TOML解析失败: {}", path.display()))?;

    validate_config(&config)?;
    Ok(config)
}

/// 校验配置有效性
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.endpoints.is_empty() {
        return Err(ProxyError::config("至少需要配置一个上游端点"));
    }

    let mut names = HashSet::new();
    for endpoint in &config.endpoints {
        if endpoint.name.is_empty() {
            return Err(ProxyError::config("端点名称不能为空"));
        }
        if !names.insert(endpoint.name.as_str()) {
            return Err(ProxyError::config(format!(
                "端点名称重复: {}",
                endpoint.name
            )));
        }
        if endpoint.url.is_empty() {
            return Err(ProxyError::config(format!(
                "端点 {} 缺少 URL",
                endpoint.name
            )));
        }
        if endpoint.priority < 1 || endpoint.group_priority < 1 {
            return Err(ProxyError::config(format!(
                "端点 {} 的优先级必须 >= 1",
                endpoint.name
            )));
        }
        if endpoint.tokens.is_empty() && endpoint.api_keys.is_empty() {
            return Err(ProxyError::config(format!(
                "端点 {} 至少需要一个 Token 或 API Key",
                endpoint.name
            )));
        }
        if let Some(m) = &endpoint.multiplier {
            if m.cost_multiplier < 0.0 {
                return Err(ProxyError::config(format!(
                    "端点 {} 的费用倍率不能为负",
                    endpoint.name
                )));
            }
        }
    }

    if config.retry.max_attempts == 0 {
        return Err(ProxyError::config("retry.max_attempts 必须 >= 1"));
    }

    Ok(())
}
