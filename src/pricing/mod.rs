//! # 模型定价服务
//!
//! 定价的增删改查与读穿缓存。持久化通过 `ModelPricingStore` 交给外部
//! 存储实现；查询路径先走内存缓存，未命中再回源并回填。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};
use crate::tracking::ModelPricing;

/// 默认定价的保留模型名
pub const DEFAULT_MODEL_NAME: &str = "_default";

/// 一条模型定价记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricingRecord {
    pub model_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// 输入价（美元 / 百万 token）
    pub input_price: f64,
    pub output_price: f64,
    pub cache_creation_price_5m: f64,
    pub cache_creation_price_1h: f64,
    pub cache_read_price: f64,
    #[serde(default)]
    pub is_default: bool,
}

impl ModelPricingRecord {
    /// 转换为费用计算所用的定价结构
    #[must_use]
    pub fn to_model_pricing(&self) -> ModelPricing {
        ModelPricing {
            input: self.input_price,
            output: self.output_price,
            cache_creation: self.cache_creation_price_5m,
            cache_creation_1h: self.cache_creation_price_1h,
            cache_read: self.cache_read_price,
        }
    }

    /// 无任何定价来源时的硬编码兜底
    #[must_use]
    pub fn hard_default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            display_name: "默认定价".to_string(),
            description: "未知模型使用的默认定价".to_string(),
            input_price: 3.0,
            output_price: 15.0,
            cache_creation_price_5m: 3.75,
            cache_creation_price_1h: 6.0,
            cache_read_price: 0.30,
            is_default: true,
        }
    }
}

/// 定价持久化存储（外部协作方的操作面）
#[async_trait]
pub trait ModelPricingStore: Send + Sync {
    async fn get(&self, model_name: &str) -> Result<Option<ModelPricingRecord>>;
    async fn get_default(&self) -> Result<Option<ModelPricingRecord>>;
    async fn list(&self) -> Result<Vec<ModelPricingRecord>>;
    async fn create(&self, record: &ModelPricingRecord) -> Result<ModelPricingRecord>;
    async fn update(&self, record: &ModelPricingRecord) -> Result<()>;
    async fn delete(&self, model_name: &str) -> Result<()>;
    async fn set_default(&self, model_name: &str) -> Result<()>;
    async fn batch_upsert(&self, records: &[ModelPricingRecord]) -> Result<()>;
    async fn count(&self) -> Result<usize>;
}

/// 进程内存实现，用于默认装配与测试
#[derive(Default)]
pub struct MemoryPricingStore {
    records: tokio::sync::RwLock<HashMap<String, ModelPricingRecord>>,
}

impl MemoryPricingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelPricingStore for MemoryPricingStore {
    async fn get(&self, model_name: &str) -> Result<Option<ModelPricingRecord>> {
        Ok(self.records.read().await.get(model_name).cloned())
    }

    async fn get_default(&self) -> Result<Option<ModelPricingRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.is_default)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<ModelPricingRecord>> {
        let mut list: Vec<_> = self.records.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.model_name.cmp(&b.model_name));
        Ok(list)
    }

    async fn create(&self, record: &ModelPricingRecord) -> Result<ModelPricingRecord> {
        let mut records = self.records.write().await;
        records.insert(record.model_name.clone(), record.clone());
        Ok(record.clone())
    }

    async fn update(&self, record: &ModelPricingRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.model_name.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, model_name: &str) -> Result<()> {
        self.records.write().await.remove(model_name);
        Ok(())
    }

    async fn set_default(&self, model_name: &str) -> Result<()> {
        let mut records = self.records.write().await;
        if !records.contains_key(model_name) {
            return Err(ProxyError::not_found("模型定价", model_name));
        }
        for record in records.values_mut() {
            record.is_default = record.model_name == model_name;
        }
        Ok(())
    }

    async fn batch_upsert(&self, batch: &[ModelPricingRecord]) -> Result<()> {
        let mut records = self.records.write().await;
        for record in batch {
            records.insert(record.model_name.clone(), record.clone());
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}

/// 模型定价业务服务
pub struct ModelPricingService {
    store: Arc<dyn ModelPricingStore>,
    cache: RwLock<HashMap<String, Arc<ModelPricingRecord>>>,
    default_pricing: RwLock<Option<Arc<ModelPricingRecord>>>,
}

impl ModelPricingService {
    #[must_use]
    pub fn new(store: Arc<dyn ModelPricingStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            default_pricing: RwLock::new(None),
        }
    }

    /// 创建新的模型定价
    pub async fn create_pricing(
        &self,
        record: &ModelPricingRecord,
    ) -> Result<ModelPricingRecord> {
        Self::validate_record(record)?;

        if self.store.get(&record.model_name).await?.is_some() {
            return Err(ProxyError::conflict(format!(
                "模型定价 '{}' 已存在",
                record.model_name
            )));
        }

        if record.is_default {
            self.clear_default_flag().await?;
        }

        let created = self.store.create(record).await?;
        self.update_cache(&created);
        tracing::info!("✅ [ModelPricingService] 创建模型定价: {}", record.model_name);
        Ok(created)
    }

    /// 获取模型定价（读穿缓存）
    pub async fn get_pricing(&self, model_name: &str) -> Result<Option<ModelPricingRecord>> {
        if let Some(cached) = self
            .cache
            .read()
            .expect("pricing cache lock poisoned")
            .get(model_name)
        {
            return Ok(Some((**cached).clone()));
        }

        let record = self.store.get(model_name).await?;
        if let Some(record) = &record {
            self.update_cache(record);
        }
        Ok(record)
    }

    /// 获取模型定价，不存在时返回默认定价
    pub async fn get_pricing_or_default(&self, model_name: &str) -> ModelPricingRecord {
        if let Ok(Some(record)) = self.get_pricing(model_name).await {
            return record;
        }
        self.get_default_pricing().await
    }

    /// 获取默认定价；存储中没有时使用硬编码兜底
    pub async fn get_default_pricing(&self) -> ModelPricingRecord {
        if let Some(cached) = self
            .default_pricing
            .read()
            .expect("pricing cache lock poisoned")
            .as_ref()
        {
            return (**cached).clone();
        }

        match self.store.get_default().await {
            Ok(Some(record)) => {
                let arc = Arc::new(record.clone());
                *self
                    .default_pricing
                    .write()
                    .expect("pricing cache lock poisoned") = Some(arc);
                record
            }
            _ => ModelPricingRecord::hard_default(),
        }
    }

    /// 列出所有模型定价
    pub async fn list_pricings(&self) -> Result<Vec<ModelPricingRecord>> {
        self.store.list().await
    }

    /// 更新模型定价
    pub async fn update_pricing(&self, record: &ModelPricingRecord) -> Result<()> {
        Self::validate_record(record)?;

        let Some(existing) = self.store.get(&record.model_name).await? else {
            return Err(ProxyError::not_found("模型定价", &record.model_name));
        };

        if record.is_default && !existing.is_default {
            self.clear_default_flag().await?;
        }

        self.store.update(record).await?;
        self.update_cache(record);
        tracing::info!("✅ [ModelPricingService] 更新模型定价: {}", record.model_name);
        Ok(())
    }

    /// 删除模型定价；默认定价不可删除
    pub async fn delete_pricing(&self, model_name: &str) -> Result<()> {
        let Some(existing) = self.store.get(model_name).await? else {
            return Err(ProxyError::not_found("模型定价", model_name));
        };
        if existing.is_default {
            return Err(ProxyError::conflict(
                "不能删除默认定价，请先设置其他模型为默认",
            ));
        }

        self.store.delete(model_name).await?;
        self.cache
            .write()
            .expect("pricing cache lock poisoned")
            .remove(model_name);
        tracing::info!("✅ [ModelPricingService] 删除模型定价: {model_name}");
        Ok(())
    }

    /// 设置默认定价
    pub async fn set_default_pricing(&self, model_name: &str) -> Result<()> {
        self.store.set_default(model_name).await?;
        self.clear_cache();
        tracing::info!("✅ [ModelPricingService] 设置默认定价: {model_name}");
        Ok(())
    }

    /// 从配置文件导入定价表；1h 价格缺省时按 2 × input 计
    pub async fn import_from_config(
        &self,
        model_pricing: &HashMap<String, ModelPricing>,
        default_pricing: &ModelPricing,
    ) -> Result<usize> {
        let mut records = Vec::with_capacity(model_pricing.len() + 1);

        for (model_name, pricing) in model_pricing {
            records.push(ModelPricingRecord {
                model_name: model_name.clone(),
                display_name: String::new(),
                description: String::new(),
                input_price: pricing.input,
                output_price: pricing.output,
                cache_creation_price_5m: pricing.cache_creation,
                cache_creation_price_1h: if pricing.cache_creation_1h > 0.0 {
                    pricing.cache_creation_1h
                } else {
                    pricing.input * 2.0
                },
                cache_read_price: pricing.cache_read,
                is_default: false,
            });
        }

        records.push(ModelPricingRecord {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            display_name: "默认定价".to_string(),
            description: "未知模型使用的默认定价".to_string(),
            input_price: default_pricing.input,
            output_price: default_pricing.output,
            cache_creation_price_5m: default_pricing.cache_creation,
            cache_creation_price_1h: if default_pricing.cache_creation_1h > 0.0 {
                default_pricing.cache_creation_1h
            } else {
                default_pricing.input * 2.0
            },
            cache_read_price: default_pricing.cache_read,
            is_default: true,
        });

        self.store.batch_upsert(&records).await?;
        self.clear_cache();

        tracing::info!(
            "✅ [ModelPricingService] 从配置导入 {} 个模型定价",
            records.len()
        );
        Ok(records.len())
    }

    /// 预热缓存：一次性装载全部定价
    pub async fn load_cache(&self) -> Result<()> {
        let records = self.store.list().await?;
        let count = records.len();

        let mut cache = HashMap::with_capacity(count);
        let mut default = None;
        for record in records {
            let arc = Arc::new(record);
            if arc.is_default {
                default = Some(Arc::clone(&arc));
            }
            cache.insert(arc.model_name.clone(), arc);
        }

        *self.cache.write().expect("pricing cache lock poisoned") = cache;
        *self
            .default_pricing
            .write()
            .expect("pricing cache lock poisoned") = default;

        tracing::info!("✅ [ModelPricingService] 加载 {count} 个模型定价到缓存");
        Ok(())
    }

    /// 定价数量
    pub async fn pricing_count(&self) -> Result<usize> {
        self.store.count().await
    }

    fn validate_record(record: &ModelPricingRecord) -> Result<()> {
        if record.model_name.is_empty() {
            return Err(ProxyError::validation_field("模型名称不能为空", "model_name"));
        }
        if record.input_price < 0.0 {
            return Err(ProxyError::validation_field("输入价格不能为负数", "input_price"));
        }
        if record.output_price < 0.0 {
            return Err(ProxyError::validation_field(
                "输出价格不能为负数",
                "output_price",
            ));
        }
        Ok(())
    }

    async fn clear_default_flag(&self) -> Result<()> {
        for mut record in self.store.list().await? {
            if record.is_default {
                record.is_default = false;
                self.store.update(&record).await?;
            }
        }
        Ok(())
    }

    fn update_cache(&self, record: &ModelPricingRecord) {
        let arc = Arc::new(record.clone());
        self.cache
            .write()
            .expect("pricing cache lock poisoned")
            .insert(record.model_name.clone(), Arc::clone(&arc));
        if record.is_default {
            *self
                .default_pricing
                .write()
                .expect("pricing cache lock poisoned") = Some(arc);
        }
    }

    fn clear_cache(&self) {
        self.cache
            .write()
            .expect("pricing cache lock poisoned")
            .clear();
        *self
            .default_pricing
            .write()
            .expect("pricing cache lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ModelPricingService {
        ModelPricingService::new(Arc::new(MemoryPricingStore::new()))
    }

    fn record(name: &str) -> ModelPricingRecord {
        ModelPricingRecord {
            model_name: name.to_string(),
            display_name: String::new(),
            description: String::new(),
            input_price: 3.0,
            output_price: 15.0,
            cache_creation_price_5m: 3.75,
            cache_creation_price_1h: 6.0,
            cache_read_price: 0.30,
            is_default: false,
        }
    }

    #[tokio::test]
    async fn hard_default_when_store_empty() {
        let svc = service();
        let default = svc.get_default_pricing().await;
        assert_eq!(default.model_name, DEFAULT_MODEL_NAME);
        assert!((default.input_price - 3.0).abs() < f64::EPSILON);
        assert!((default.cache_creation_price_1h - 6.0).abs() < f64::EPSILON);
        assert!(default.is_default);
    }

    #[tokio::test]
    async fn create_get_roundtrip_with_cache() {
        let svc = service();
        svc.create_pricing(&record("claude-3-sonnet")).await.unwrap();

        let fetched = svc.get_pricing("claude-3-sonnet").await.unwrap().unwrap();
        assert!((fetched.output_price - 15.0).abs() < f64::EPSILON);

        // 第二次命中缓存，结果一致
        let cached = svc.get_pricing("claude-3-sonnet").await.unwrap().unwrap();
        assert_eq!(cached.model_name, fetched.model_name);
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let svc = service();
        svc.create_pricing(&record("m1")).await.unwrap();
        let err = svc.create_pricing(&record("m1")).await.unwrap_err();
        assert!(err.to_string().contains("已存在"));
    }

    #[tokio::test]
    async fn validation_rejects_bad_records() {
        let svc = service();
        let mut bad = record("");
        assert!(svc.create_pricing(&bad).await.is_err());

        bad = record("m");
        bad.input_price = -1.0;
        let err = svc.create_pricing(&bad).await.unwrap_err();
        assert!(err.to_string().contains("输入价格不能为负数"));
    }

    #[tokio::test]
    async fn default_pricing_cannot_be_deleted() {
        let svc = service();
        let mut def = record("base");
        def.is_default = true;
        svc.create_pricing(&def).await.unwrap();

        let err = svc.delete_pricing("base").await.unwrap_err();
        assert!(err.to_string().contains("不能删除默认定价"));
    }

    #[tokio::test]
    async fn only_one_default_at_a_time() {
        let svc = service();
        let mut first = record("a");
        first.is_default = true;
        svc.create_pricing(&first).await.unwrap();

        let mut second = record("b");
        second.is_default = true;
        svc.create_pricing(&second).await.unwrap();

        let defaults: Vec<_> = svc
            .list_pricings()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].model_name, "b");
    }

    #[tokio::test]
    async fn import_computes_missing_1h_price() {
        let svc = service();
        let mut models = HashMap::new();
        models.insert(
            "claude-opus".to_string(),
            ModelPricing {
                input: 15.0,
                output: 75.0,
                cache_creation: 18.75,
                cache_creation_1h: 0.0,
                cache_read: 1.5,
            },
        );
        let default = ModelPricing {
            input: 3.0,
            output: 15.0,
            cache_creation: 3.75,
            cache_creation_1h: 0.0,
            cache_read: 0.30,
        };

        let imported = svc.import_from_config(&models, &default).await.unwrap();
        assert_eq!(imported, 2);

        let opus = svc.get_pricing("claude-opus").await.unwrap().unwrap();
        assert!((opus.cache_creation_price_1h - 30.0).abs() < f64::EPSILON);

        let def = svc.get_default_pricing().await;
        assert_eq!(def.model_name, DEFAULT_MODEL_NAME);
        assert!((def.cache_creation_price_1h - 6.0).abs() < f64::EPSILON);
    }
}
