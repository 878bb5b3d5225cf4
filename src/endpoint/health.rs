//! # 端点健康检查
//!
//! 用轻量 GET 携带当前生效凭证探测上游。上游可达（HTTP < 500）即视为
//! 健康；连续失败达到阈值才判定为不健康，单次成功立即恢复。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::types::Credential;
use super::EndpointManager;
use crate::config::HealthConfig;
use crate::error::{ProxyError, Result};

/// 单次探测结果
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub healthy: bool,
    pub response_time: Duration,
    pub error: Option<String>,
    /// 连请求都没发出去（连接失败/超时），区别于上游返回 5xx
    pub transport_failure: bool,
}

/// HTTP 健康检查器
#[derive(Clone)]
pub struct HealthChecker {
    client: reqwest::Client,
    config: HealthConfig,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProxyError::internal_with_source("创建健康检查客户端失败", e))?;
        Ok(Self { client, config })
    }

    /// 探测单个端点
    pub async fn probe(&self, base_url: &str, credential: Option<&Credential>) -> ProbeOutcome {
        let url = format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            self.config.path
        );

        let mut request = self.client.get(&url);
        match credential {
            Some(Credential::Bearer(token)) => {
                request = request.header("Authorization", format!("Bearer {token}"));
            }
            Some(Credential::ApiKey(key)) => {
                request = request.header("x-api-key", key.clone());
            }
            None => {}
        }

        let start = Instant::now();
        match request.send().await {
            Ok(response) => {
                let response_time = start.elapsed();
                let status = response.status();
                if status.as_u16() < 500 {
                    ProbeOutcome {
                        healthy: true,
                        response_time,
                        error: None,
                        transport_failure: false,
                    }
                } else {
                    ProbeOutcome {
                        healthy: false,
                        response_time,
                        error: Some(format!("上游返回 HTTP {status}")),
                        transport_failure: false,
                    }
                }
            }
            Err(err) => ProbeOutcome {
                healthy: false,
                response_time: start.elapsed(),
                error: Some(format!("探测请求失败: {err}")),
                transport_failure: true,
            },
        }
    }
}

/// 启动周期健康检查任务；启动时先做一轮全量检查
pub fn spawn_health_loop(manager: Arc<EndpointManager>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let interval = manager.health_config().interval();
        manager.check_all_endpoints().await;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // 首个 tick 立即返回，上面已经做过一轮

        loop {
            tokio::select! {
                _ = ticker.tick() => manager.check_all_endpoints().await,
                () = cancel.cancelled() => return,
            }
        }
    });
}
