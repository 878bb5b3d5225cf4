//! # 应用上下文
//!
//! 跨模块共享的服务实例容器，便于管理接口访问各子系统、
//! 在测试中注入替身实现。

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::endpoint::{spawn_health_loop, EndpointManager, GroupManager, KeyManager};
use crate::error::Result;
use crate::logging::BroadcastHandler;
use crate::monitoring::Monitoring;
use crate::pricing::{MemoryPricingStore, ModelPricingService};
use crate::proxy::Dispatcher;
use crate::tracking::{
    spawn_archive_writer, HotPool, HotPoolConfig, MemoryRequestStore, RequestStore,
};

/// 应用上下文
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub config_path: String,
    pub start_time: DateTime<Utc>,

    pub endpoint_manager: Arc<EndpointManager>,
    pub hot_pool: Arc<HotPool>,
    pub monitoring: Arc<Monitoring>,
    pub pricing: Arc<ModelPricingService>,
    pub dispatcher: Arc<Dispatcher>,
    pub broadcast: Option<Arc<BroadcastHandler>>,

    /// 实际绑定的端口（启动后填充）
    pub proxy_port: OnceLock<u16>,
    pub web_port: OnceLock<u16>,
}

impl AppContext {
    /// 装配全部子系统并启动后台任务（健康检查、归档写入、热池清理）
    pub async fn build(
        config: AppConfig,
        config_path: String,
        broadcast: Option<Arc<BroadcastHandler>>,
        request_store: Option<Arc<dyn RequestStore>>,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>> {
        let config = Arc::new(config);

        let key_manager = Arc::new(KeyManager::new());
        let group_manager = Arc::new(GroupManager::new(
            config.group.cooldown(),
            config.group.allow_multiple_active,
        ));
        let endpoint_manager = EndpointManager::new(
            &config.endpoints,
            config.health.clone(),
            group_manager,
            key_manager,
        )?;

        let hot_pool = HotPool::new(HotPoolConfig {
            max_age: std::time::Duration::from_secs(config.hot_pool.max_age_secs),
            max_size: config.hot_pool.max_size,
            cleanup_interval: std::time::Duration::from_secs(config.hot_pool.cleanup_interval_secs),
        });

        let store = request_store.unwrap_or_else(|| Arc::new(MemoryRequestStore::new()));
        spawn_archive_writer(&hot_pool, store, cancel.clone());

        let monitoring = Arc::new(Monitoring::new());

        let pricing = Arc::new(ModelPricingService::new(Arc::new(MemoryPricingStore::new())));
        if !config.model_pricing.is_empty() || config.default_pricing.is_some() {
            let default = config
                .default_pricing
                .unwrap_or_else(|| crate::pricing::ModelPricingRecord::hard_default().to_model_pricing());
            pricing
                .import_from_config(&config.model_pricing, &default)
                .await?;
            pricing.load_cache().await?;
        }

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&config),
            Arc::clone(&endpoint_manager),
            Arc::clone(&hot_pool),
            Arc::clone(&monitoring),
            Arc::clone(&pricing),
        )?);

        spawn_health_loop(Arc::clone(&endpoint_manager), cancel);

        Ok(Arc::new(Self {
            config,
            config_path,
            start_time: Utc::now(),
            endpoint_manager,
            hot_pool,
            monitoring,
            pricing,
            dispatcher,
            broadcast,
            proxy_port: OnceLock::new(),
            web_port: OnceLock::new(),
        }))
    }

    /// 进程运行时长
    #[must_use]
    pub fn uptime(&self) -> std::time::Duration {
        (Utc::now() - self.start_time).to_std().unwrap_or_default()
    }
}
