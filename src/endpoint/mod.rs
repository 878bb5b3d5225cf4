//! # 端点管理模块
//!
//! 端点目录、健康检查、凭证轮换与分组状态的统一入口。

pub mod group_manager;
pub mod health;
pub mod key_manager;
pub mod types;

pub use group_manager::{EndpointSnapshot, Group, GroupDetail, GroupManager};
pub use health::{spawn_health_loop, HealthChecker, ProbeOutcome};
pub use key_manager::{mask_key, EndpointKeyState, KeyManager};
pub use types::{Credential, Endpoint, EndpointKeysInfo, EndpointStatus};

use std::sync::{Arc, RwLock};

use chrono::{SecondsFormat, Utc};
use tokio::sync::Semaphore;

use crate::config::{EndpointConfig, HealthConfig};
use crate::error::{ProxyError, Result};

/// 批量健康检查的并发上限
const BATCH_CHECK_CONCURRENCY: usize = 8;

/// 端点管理器：目录快照读取、健康检查、凭证切换
pub struct EndpointManager {
    endpoints: RwLock<Vec<Endpoint>>,
    group_manager: Arc<GroupManager>,
    key_manager: Arc<KeyManager>,
    checker: HealthChecker,
    health_config: HealthConfig,
}

impl EndpointManager {
    pub fn new(
        configs: &[EndpointConfig],
        health_config: HealthConfig,
        group_manager: Arc<GroupManager>,
        key_manager: Arc<KeyManager>,
    ) -> Result<Arc<Self>> {
        let mut endpoints: Vec<Endpoint> = configs
            .iter()
            .map(|cfg| Endpoint::new(cfg.clone()))
            .collect();
        endpoints.sort_by_key(|e| e.config.priority);

        for endpoint in &endpoints {
            key_manager.init_endpoint(
                &endpoint.config.name,
                endpoint.config.tokens.len(),
                endpoint.config.api_keys.len(),
            );
        }

        let checker = HealthChecker::new(health_config.clone())?;
        let manager = Arc::new(Self {
            endpoints: RwLock::new(endpoints),
            group_manager,
            key_manager,
            checker,
            health_config,
        });
        manager.sync_groups();
        Ok(manager)
    }

    #[must_use]
    pub fn group_manager(&self) -> &Arc<GroupManager> {
        &self.group_manager
    }

    #[must_use]
    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.key_manager
    }

    #[must_use]
    pub fn health_config(&self) -> &HealthConfig {
        &self.health_config
    }

    /// 目录快照
    #[must_use]
    pub fn get_endpoints(&self) -> Vec<Endpoint> {
        self.read().clone()
    }

    /// 单个端点快照
    #[must_use]
    pub fn get_endpoint(&self, name: &str) -> Option<Endpoint> {
        self.read().iter().find(|e| e.config.name == name).cloned()
    }

    /// 单个端点的健康状态
    pub fn get_endpoint_status(&self, name: &str) -> Result<EndpointStatus> {
        self.get_endpoint(name)
            .map(|e| e.status)
            .ok_or_else(|| ProxyError::not_found("端点", name))
    }

    /// 更新端点组内优先级并重排目录
    pub fn update_endpoint_priority(&self, name: &str, priority: u32) -> Result<()> {
        if priority < 1 {
            return Err(ProxyError::validation_field("优先级必须 >= 1", "priority"));
        }

        {
            let mut endpoints = self.write();
            let Some(endpoint) = endpoints.iter_mut().find(|e| e.config.name == name) else {
                return Err(ProxyError::not_found("端点", name));
            };
            endpoint.config.priority = priority;
            endpoints.sort_by_key(|e| e.config.priority);
        }

        self.sync_groups();
        tracing::info!("🔄 端点 {name} 优先级更新为 {priority}");
        Ok(())
    }

    /// 端点当前生效的凭证；Token 优先于 API Key
    #[must_use]
    pub fn active_credential(&self, name: &str) -> Option<Credential> {
        let endpoint = self.get_endpoint(name)?;
        if !endpoint.config.tokens.is_empty() {
            let idx = self
                .key_manager
                .get_active_token_index(name)
                .min(endpoint.config.tokens.len() - 1);
            return Some(Credential::Bearer(endpoint.config.tokens[idx].clone()));
        }
        if !endpoint.config.api_keys.is_empty() {
            let idx = self
                .key_manager
                .get_active_api_key_index(name)
                .min(endpoint.config.api_keys.len() - 1);
            return Some(Credential::ApiKey(endpoint.config.api_keys[idx].clone()));
        }
        None
    }

    /// 凭证失效时轮换到下一个凭证，返回新凭证描述（日志用）
    pub fn rotate_credential(&self, name: &str) -> Result<String> {
        let endpoint = self
            .get_endpoint(name)
            .ok_or_else(|| ProxyError::not_found("端点", name))?;

        if endpoint.config.tokens.len() > 1 {
            let idx = self.key_manager.advance_token(name)?;
            return Ok(format!("token#{idx}"));
        }
        if endpoint.config.api_keys.len() > 1 {
            let idx = self.key_manager.advance_api_key(name)?;
            return Ok(format!("api-key#{idx}"));
        }
        Err(ProxyError::conflict(format!(
            "端点 {name} 没有可轮换的备用凭证"
        )))
    }

    /// 切换端点 Token（管理接口）
    pub fn switch_endpoint_token(&self, name: &str, index: usize) -> Result<()> {
        if self.get_endpoint(name).is_none() {
            return Err(ProxyError::not_found("端点", name));
        }
        self.key_manager.switch_token(name, index)
    }

    /// 切换端点 API Key（管理接口）
    pub fn switch_endpoint_api_key(&self, name: &str, index: usize) -> Result<()> {
        if self.get_endpoint(name).is_none() {
            return Err(ProxyError::not_found("端点", name));
        }
        self.key_manager.switch_api_key(name, index)
    }

    /// 端点凭证状态的脱敏视图
    #[must_use]
    pub fn get_endpoint_keys_info(&self, name: &str) -> Option<EndpointKeysInfo> {
        let endpoint = self.get_endpoint(name)?;
        let state = self.key_manager.get_endpoint_key_state(name);

        let (active_token_index, active_api_key_index, last_switch_time) = state.map_or(
            (0, 0, None),
            |s| {
                (
                    s.active_token_index,
                    s.active_api_key_index,
                    s.last_switch_time
                        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
                )
            },
        );

        Some(EndpointKeysInfo {
            endpoint: endpoint.config.name.clone(),
            url: endpoint.config.url.clone(),
            token_count: endpoint.config.tokens.len(),
            api_key_count: endpoint.config.api_keys.len(),
            active_token_index,
            active_api_key_index,
            tokens: endpoint.config.tokens.iter().map(|t| mask_key(t)).collect(),
            api_keys: endpoint
                .config
                .api_keys
                .iter()
                .map(|k| mask_key(k))
                .collect(),
            has_multiple_tokens: endpoint.config.tokens.len() > 1,
            last_switch_time,
        })
    }

    /// 全部端点的凭证概览
    #[must_use]
    pub fn keys_overview(&self) -> Vec<EndpointKeysInfo> {
        self.get_endpoints()
            .iter()
            .filter_map(|e| self.get_endpoint_keys_info(&e.config.name))
            .collect()
    }

    /// 调度候选：活跃组按组优先级展开，组内按端点优先级排列，
    /// 已知不健康的端点排到末尾兜底。
    #[must_use]
    pub fn candidate_endpoints(&self) -> Vec<(String, Endpoint)> {
        let mut candidates = Vec::new();
        for group in self.group_manager.get_active_groups() {
            let mut members: Vec<Endpoint> = group
                .endpoints
                .iter()
                .filter_map(|ge| self.get_endpoint(&ge.name))
                .collect();
            members.sort_by_key(|e| (!e.usable(), e.config.priority));
            for endpoint in members {
                candidates.push((group.name.clone(), endpoint));
            }
        }
        candidates
    }

    /// 手动（带外）健康检查单个端点
    pub async fn manual_health_check(&self, name: &str) -> Result<EndpointStatus> {
        let endpoint = self
            .get_endpoint(name)
            .ok_or_else(|| ProxyError::not_found("端点", name))?;
        let credential = self.active_credential(name);

        let outcome = self.checker.probe(&endpoint.config.url, credential.as_ref()).await;
        if let Some(error) = &outcome.error {
            tracing::warn!("🔍 手动健康检测失败: {name}: {error}");
        }
        self.apply_probe_result(name, &outcome, true);

        if outcome.transport_failure {
            return Err(ProxyError::health_check(
                outcome.error.unwrap_or_else(|| "探测请求失败".to_string()),
            ));
        }
        self.get_endpoint_status(name)
    }

    /// 并发检查全部端点，返回 (健康数, 不健康数)
    pub async fn batch_health_check_all(&self) -> Result<(usize, usize)> {
        self.run_checks(true).await;

        let endpoints = self.get_endpoints();
        let healthy = endpoints.iter().filter(|e| e.status.healthy).count();
        Ok((healthy, endpoints.len() - healthy))
    }

    /// 周期检查入口（阈值判定）
    pub async fn check_all_endpoints(&self) {
        self.run_checks(false).await;
    }

    async fn run_checks(&self, manual: bool) {
        let targets: Vec<(String, String, Option<Credential>)> = self
            .get_endpoints()
            .iter()
            .map(|e| {
                (
                    e.config.name.clone(),
                    e.config.url.clone(),
                    self.active_credential(&e.config.name),
                )
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(BATCH_CHECK_CONCURRENCY));
        let mut join_set = tokio::task::JoinSet::new();

        for (name, url, credential) in targets {
            let permit = Arc::clone(&semaphore);
            let checker = self.checker.clone();
            // 探测在独立任务中并发执行，结果回到本地统一应用
            join_set.spawn(async move {
                let _permit = permit.acquire_owned().await;
                let outcome = checker.probe(&url, credential.as_ref()).await;
                (name, outcome)
            });
        }

        while let Some(result) = join_set.join_next().await {
            if let Ok((name, outcome)) = result {
                self.apply_probe_result(&name, &outcome, manual);
            }
        }
    }

    fn apply_probe_result(&self, name: &str, outcome: &ProbeOutcome, manual: bool) {
        let mut recovered = false;
        {
            let mut endpoints = self.write();
            let Some(endpoint) = endpoints.iter_mut().find(|e| e.config.name == name) else {
                return;
            };

            let was_healthy = endpoint.status.healthy && !endpoint.status.never_checked;
            endpoint.status.last_check = Some(Utc::now());
            endpoint.status.never_checked = false;
            endpoint.status.response_time = outcome.response_time;

            if outcome.healthy {
                endpoint.status.consecutive_failures = 0;
                endpoint.status.healthy = true;
                endpoint.status.error = None;
                recovered = !was_healthy;
            } else {
                endpoint.status.consecutive_failures += 1;
                endpoint.status.error = outcome.error.clone();
                if manual
                    || endpoint.status.consecutive_failures >= self.health_config.failure_threshold
                {
                    endpoint.status.healthy = false;
                }
            }
        }

        self.sync_groups();
        if recovered {
            tracing::info!("💚 端点 {name} 恢复健康");
            self.group_manager.notify_endpoint_recovered();
        }
    }

    /// 把端点目录快照同步进组管理器
    pub fn sync_groups(&self) {
        let snapshots: Vec<EndpointSnapshot> = self
            .read()
            .iter()
            .map(|e| EndpointSnapshot {
                name: e.config.name.clone(),
                priority: e.config.priority,
                group_priority: e.config.group_priority,
                healthy: e.status.healthy || e.status.never_checked,
            })
            .collect();
        self.group_manager.update_groups(&snapshots);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Endpoint>> {
        self.endpoints.read().expect("endpoint catalog lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Endpoint>> {
        self.endpoints.write().expect("endpoint catalog lock poisoned")
    }
}
