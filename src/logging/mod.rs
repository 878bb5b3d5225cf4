//! # 统一日志模块
//!
//! 提供完整的日志链路：
//! - `tracing` 订阅链初始化（终端输出 + 广播分发）
//! - 广播处理器：文件、环形缓冲、仪表盘事件三路分发
//! - 日志级别预设（生产/开发/测试）

pub mod broadcast;
pub mod event_batcher;
pub mod ring_buffer;

pub use broadcast::{BroadcastHandler, BroadcastLayer, LogEntry, LogRecord};
pub use event_batcher::{EventBatcher, LogEventSink, LOG_BATCH_EVENT};
pub use ring_buffer::RingBuffer;

use std::env;
use std::io::Write;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 日志系统配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 默认日志级别
    pub default_level: String,
    /// 应用程序日志级别
    pub app_level: String,
    /// 环形缓冲区容量
    pub buffer_size: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            app_level: "debug".to_string(),
            buffer_size: 1000,
        }
    }
}

impl LoggingConfig {
    /// 生产环境配置
    #[must_use]
    pub fn production() -> Self {
        Self {
            default_level: "info".to_string(),
            app_level: "info".to_string(),
            buffer_size: 1000,
        }
    }

    /// 开发环境配置
    #[must_use]
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            app_level: "trace".to_string(),
            buffer_size: 1000,
        }
    }

    /// 测试环境配置
    #[must_use]
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            app_level: "debug".to_string(),
            buffer_size: 256,
        }
    }

    /// 通过 `LOG_MODE` 环境变量选择预设（production / development / testing）
    #[must_use]
    pub fn from_env() -> Self {
        match env::var("LOG_MODE").ok().as_deref() {
            Some("development") => Self::development(),
            Some("testing") => Self::testing(),
            _ => Self::production(),
        }
    }

    /// 构建日志过滤器字符串
    #[must_use]
    pub fn build_filter(&self) -> String {
        format!("{},cc_forwarder={}", self.default_level, self.app_level)
    }
}

/// 初始化日志系统
///
/// 订阅链：`EnvFilter` → 终端 fmt 层 + 广播层。返回广播处理器句柄，
/// 供管理接口查询历史日志、仪表盘挂接事件发射器。
pub fn init_logging(
    config: &LoggingConfig,
    file: Box<dyn Write + Send>,
    level_override: Option<&str>,
) -> Arc<BroadcastHandler> {
    let mut final_config = config.clone();
    if let Some(level) = level_override {
        final_config.default_level = level.to_string();
    }

    let filter_string = final_config.build_filter();
    let log_filter = env::var("RUST_LOG").unwrap_or(filter_string);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::try_new(&log_filter).unwrap_or_default());

    let handler = Arc::new(BroadcastHandler::new(file, final_config.buffer_size));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(BroadcastLayer::new(Arc::clone(&handler)))
        .init();

    tracing::info!("日志系统已启动 - 过滤器: {log_filter}");

    handler
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_string_includes_app_target() {
        let config = LoggingConfig::production();
        assert_eq!(config.build_filter(), "info,cc_forwarder=info");
    }

    #[test]
    fn presets_differ() {
        assert_eq!(LoggingConfig::development().default_level, "debug");
        assert_eq!(LoggingConfig::testing().default_level, "warn");
        assert_eq!(LoggingConfig::default().app_level, "debug");
    }
}
