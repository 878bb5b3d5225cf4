//! 活跃请求热池
//!
//! 所有在途请求的内存索引。请求完成后经两阶段归档落库：
//! `complete_and_archive` 先把条目挪进归档缓存并触发归档回调，
//! 存储写入方确认持久化后调用 `confirm_archived` 将其真正清除。
//! 进程在两阶段之间崩溃时，归档缓存就是尚未落库请求的缓冲。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::types::{ActiveRequest, RequestStatus};
use crate::error::{ProxyError, Result};

/// 归档回调：把已完成的请求交给存储写入方
pub type ArchiveCallback = Arc<dyn Fn(ActiveRequest) + Send + Sync>;

/// 热池配置
#[derive(Debug, Clone, Copy)]
pub struct HotPoolConfig {
    /// 条目最大驻留时长，超龄条目由清理任务归档
    pub max_age: Duration,
    /// 在途请求上限，超出后拒绝新请求
    pub max_size: usize,
    /// 清理任务执行间隔
    pub cleanup_interval: Duration,
}

impl Default for HotPoolConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30 * 60),
            max_size: 1000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// 热池运行统计
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct HotPoolStats {
    pub total_added: u64,
    pub total_removed: u64,
    pub total_archived: u64,
    pub total_overflow: u64,
    pub current_size: usize,
    pub archiving_size: usize,
    pub peak_size: usize,
}

struct PoolInner {
    requests: HashMap<String, ActiveRequest>,
    archiving: HashMap<String, ActiveRequest>,
    callback: Option<ArchiveCallback>,
    closed: bool,
    total_added: u64,
    total_removed: u64,
    total_archived: u64,
    total_overflow: u64,
    peak_size: usize,
}

/// 活跃请求热池
pub struct HotPool {
    config: HotPoolConfig,
    inner: Mutex<PoolInner>,
    cancel: CancellationToken,
}

impl HotPool {
    /// 创建热池并启动后台清理任务（需在 tokio 运行时内调用才会启动清理）
    #[must_use]
    pub fn new(config: HotPoolConfig) -> Arc<Self> {
        let pool = Arc::new(Self {
            config,
            inner: Mutex::new(PoolInner {
                requests: HashMap::new(),
                archiving: HashMap::new(),
                callback: None,
                closed: false,
                total_added: 0,
                total_removed: 0,
                total_archived: 0,
                total_overflow: 0,
                peak_size: 0,
            }),
            cancel: CancellationToken::new(),
        });

        if tokio::runtime::Handle::try_current().is_ok() {
            let weak = Arc::downgrade(&pool);
            let cancel = pool.cancel.clone();
            let interval = config.cleanup_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let Some(pool) = weak.upgrade() else { return };
                            pool.cleanup_expired();
                        }
                        () = cancel.cancelled() => return,
                    }
                }
            });
        }

        pool
    }

    /// 设置归档回调
    pub fn set_archive_callback(&self, callback: ArchiveCallback) {
        let mut inner = self.lock();
        inner.callback = Some(callback);
    }

    /// 登记新请求；重复 ID 或池满时拒绝
    pub fn add(&self, req: ActiveRequest) -> Result<()> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ProxyError::internal("热池已关闭，拒绝新请求"));
        }
        if inner.requests.contains_key(&req.request_id)
            || inner.archiving.contains_key(&req.request_id)
        {
            return Err(ProxyError::conflict(format!(
                "请求 {} 已存在于热池",
                req.request_id
            )));
        }

        inner.total_added += 1;
        if inner.requests.len() >= self.config.max_size {
            inner.total_overflow += 1;
            return Err(ProxyError::overflow(format!(
                "活跃请求数已达上限 {}",
                self.config.max_size
            )));
        }

        inner.requests.insert(req.request_id.clone(), req);
        let size = inner.requests.len();
        if size > inner.peak_size {
            inner.peak_size = size;
        }
        Ok(())
    }

    /// 读取单个请求的快照
    #[must_use]
    pub fn get(&self, request_id: &str) -> Option<ActiveRequest> {
        let inner = self.lock();
        inner
            .requests
            .get(request_id)
            .or_else(|| inner.archiving.get(request_id))
            .cloned()
    }

    /// 原地更新单个请求
    pub fn update<F>(&self, request_id: &str, mutator: F) -> Result<()>
    where
        F: FnOnce(&mut ActiveRequest),
    {
        let mut inner = self.lock();
        let Some(req) = inner.requests.get_mut(request_id) else {
            return Err(ProxyError::not_found("请求", request_id));
        };
        mutator(req);
        Ok(())
    }

    /// 直接移除（不归档），返回被移除的请求
    pub fn remove(&self, request_id: &str) -> Option<ActiveRequest> {
        let mut inner = self.lock();
        let removed = inner.requests.remove(request_id);
        if removed.is_some() {
            inner.total_removed += 1;
        }
        removed
    }

    /// 终结请求并移入归档缓存，触发归档回调
    ///
    /// `finalize` 负责写入终态字段；结束时间未设置时补为当前时间。
    pub fn complete_and_archive<F>(&self, request_id: &str, finalize: F) -> Result<()>
    where
        F: FnOnce(&mut ActiveRequest),
    {
        let (callback, archived) = {
            let mut inner = self.lock();
            let Some(mut req) = inner.requests.remove(request_id) else {
                return Err(ProxyError::not_found("请求", request_id));
            };
            finalize(&mut req);
            if req.end_time.is_none() {
                req.end_time = Some(Utc::now());
            }
            inner.total_removed += 1;
            inner.total_archived += 1;
            inner.archiving.insert(req.request_id.clone(), req.clone());
            (inner.callback.clone(), req)
        };

        // 回调在锁外执行
        if let Some(cb) = callback {
            cb(archived);
        }
        Ok(())
    }

    /// 存储写入确认后，从归档缓存清除对应条目
    pub fn confirm_archived(&self, request_ids: &[String]) {
        let mut inner = self.lock();
        for id in request_ids {
            inner.archiving.remove(id);
        }
    }

    /// 在途总数（含归档缓存中尚未确认的条目）
    #[must_use]
    pub fn get_active_count(&self) -> usize {
        let inner = self.lock();
        inner.requests.len() + inner.archiving.len()
    }

    /// 归档缓存中的条目数
    #[must_use]
    pub fn get_archiving_count(&self) -> usize {
        self.lock().archiving.len()
    }

    /// 所有在途请求的快照（按开始时间排序）
    #[must_use]
    pub fn list_active(&self) -> Vec<ActiveRequest> {
        let inner = self.lock();
        let mut list: Vec<_> = inner.requests.values().cloned().collect();
        list.sort_by_key(|r| r.start_time);
        list
    }

    /// 运行统计快照
    #[must_use]
    pub fn get_stats(&self) -> HotPoolStats {
        let inner = self.lock();
        HotPoolStats {
            total_added: inner.total_added,
            total_removed: inner.total_removed,
            total_archived: inner.total_archived,
            total_overflow: inner.total_overflow,
            current_size: inner.requests.len(),
            archiving_size: inner.archiving.len(),
            peak_size: inner.peak_size,
        }
    }

    /// 关闭热池：停止清理任务，剩余请求全部走归档回调
    pub fn close(&self) {
        self.cancel.cancel();

        let (callback, drained) = {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;

            let ids: Vec<String> = inner.requests.keys().cloned().collect();
            let mut drained = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(mut req) = inner.requests.remove(&id) {
                    if req.end_time.is_none() {
                        req.end_time = Some(Utc::now());
                    }
                    inner.total_removed += 1;
                    inner.total_archived += 1;
                    inner.archiving.insert(req.request_id.clone(), req.clone());
                    drained.push(req);
                }
            }
            (inner.callback.clone(), drained)
        };

        if let Some(cb) = callback {
            for req in drained {
                cb(req);
            }
        }
    }

    fn cleanup_expired(&self) {
        let max_age =
            chrono::Duration::from_std(self.config.max_age).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();

        let (callback, expired) = {
            let mut inner = self.lock();
            let expired_ids: Vec<String> = inner
                .requests
                .iter()
                .filter(|(_, r)| now - r.start_time > max_age)
                .map(|(id, _)| id.clone())
                .collect();

            let mut expired = Vec::with_capacity(expired_ids.len());
            for id in expired_ids {
                if let Some(mut req) = inner.requests.remove(&id) {
                    if !req.status.is_terminal() {
                        req.status = RequestStatus::Failed;
                    }
                    if req.end_time.is_none() {
                        req.end_time = Some(now);
                    }
                    inner.total_removed += 1;
                    inner.total_archived += 1;
                    inner.archiving.insert(req.request_id.clone(), req.clone());
                    expired.push(req);
                }
            }
            (inner.callback.clone(), expired)
        };

        if !expired.is_empty() {
            tracing::warn!("热池清理: {} 个超龄请求已转入归档", expired.len());
            if let Some(cb) = callback {
                for req in expired {
                    cb(req);
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        self.inner.lock().expect("hot pool lock poisoned")
    }
}

impl Drop for HotPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn request(id: &str) -> ActiveRequest {
        ActiveRequest::new(id, "127.0.0.1", "test-agent", "POST", "/v1/messages", false)
    }

    #[tokio::test]
    async fn add_and_duplicate() {
        let pool = HotPool::new(HotPoolConfig::default());
        pool.add(request("req-001")).unwrap();
        assert_eq!(pool.get_active_count(), 1);

        let err = pool.add(request("req-001")).unwrap_err();
        assert!(err.to_string().contains("已存在"));
    }

    #[tokio::test]
    async fn update_mutates_entry() {
        let pool = HotPool::new(HotPoolConfig::default());
        pool.add(request("req-002")).unwrap();

        pool.update("req-002", |r| {
            r.status = RequestStatus::Forwarding;
            r.endpoint_name = "primary".to_string();
            r.retry_count = 1;
        })
        .unwrap();

        let updated = pool.get("req-002").unwrap();
        assert_eq!(updated.status, RequestStatus::Forwarding);
        assert_eq!(updated.endpoint_name, "primary");
        assert_eq!(updated.retry_count, 1);

        assert!(pool.update("non-existent", |_| {}).is_err());
    }

    #[tokio::test]
    async fn remove_without_archive() {
        let pool = HotPool::new(HotPoolConfig::default());
        pool.add(request("req-003")).unwrap();

        let removed = pool.remove("req-003").unwrap();
        assert_eq!(removed.request_id, "req-003");
        assert_eq!(pool.get_active_count(), 0);
        assert!(pool.remove("non-existent").is_none());
    }

    #[tokio::test]
    async fn complete_and_archive_two_phase() {
        let pool = HotPool::new(HotPoolConfig::default());
        let archived: Arc<StdMutex<Vec<ActiveRequest>>> = Arc::new(StdMutex::new(Vec::new()));
        {
            let archived = archived.clone();
            pool.set_archive_callback(Arc::new(move |req| {
                archived.lock().unwrap().push(req);
            }));
        }

        pool.add(request("req-004")).unwrap();
        pool.complete_and_archive("req-004", |r| {
            r.status = RequestStatus::Completed;
            r.model_name = "claude-3-sonnet".to_string();
            r.usage.input_tokens = 100;
            r.usage.output_tokens = 200;
        })
        .unwrap();

        {
            let archived = archived.lock().unwrap();
            assert_eq!(archived.len(), 1);
            assert_eq!(archived[0].status, RequestStatus::Completed);
            assert_eq!(archived[0].model_name, "claude-3-sonnet");
            assert!(archived[0].end_time.is_some());
        }

        // 等待落库确认期间仍计入在途
        assert_eq!(pool.get_active_count(), 1);
        assert_eq!(pool.get_archiving_count(), 1);

        pool.confirm_archived(&["req-004".to_string()]);
        assert_eq!(pool.get_active_count(), 0);
        assert_eq!(pool.get_archiving_count(), 0);
    }

    #[tokio::test]
    async fn overflow_rejects_and_counts() {
        let pool = HotPool::new(HotPoolConfig {
            max_age: Duration::from_secs(1800),
            max_size: 5,
            cleanup_interval: Duration::from_secs(3600),
        });

        for i in 0..5 {
            pool.add(request(&format!("req-{i}"))).unwrap();
        }

        let err = pool.add(request("overflow")).unwrap_err();
        assert!(matches!(err, ProxyError::Overflow { .. }));

        let stats = pool.get_stats();
        assert_eq!(stats.total_overflow, 1);
        assert_eq!(pool.get_active_count(), 5);
        // total_added 含溢出被拒的尝试
        assert_eq!(
            stats.total_added,
            (stats.current_size as u64) + stats.total_removed + stats.total_overflow
        );
    }

    #[tokio::test]
    async fn stats_track_lifecycle() {
        let pool = HotPool::new(HotPoolConfig::default());
        pool.set_archive_callback(Arc::new(|_| {}));

        for id in ["a", "b", "c"] {
            pool.add(request(id)).unwrap();
        }
        pool.complete_and_archive("a", |r| r.status = RequestStatus::Completed)
            .unwrap();

        let stats = pool.get_stats();
        assert_eq!(stats.total_added, 3);
        assert_eq!(stats.total_removed, 1);
        assert_eq!(stats.total_archived, 1);
        assert_eq!(stats.current_size, 2);
        assert_eq!(stats.peak_size, 3);
    }

    #[tokio::test]
    async fn close_archives_remaining() {
        let pool = HotPool::new(HotPoolConfig::default());
        let archived: Arc<StdMutex<Vec<ActiveRequest>>> = Arc::new(StdMutex::new(Vec::new()));
        {
            let archived = archived.clone();
            pool.set_archive_callback(Arc::new(move |req| {
                archived.lock().unwrap().push(req);
            }));
        }

        for id in ["a", "b", "c"] {
            pool.add(request(id)).unwrap();
        }
        pool.close();

        assert_eq!(archived.lock().unwrap().len(), 3);
        assert!(pool.add(request("new")).is_err());
    }

    #[tokio::test]
    async fn concurrent_adds_stay_consistent() {
        let pool = HotPool::new(HotPoolConfig {
            max_size: 1000,
            ..HotPoolConfig::default()
        });

        let mut handles = Vec::new();
        for g in 0..20 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let _ = pool.add(request(&format!("req-{g}-{i}")));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let stats = pool.get_stats();
        assert_eq!(stats.current_size, 200);
        assert_eq!(
            stats.total_added,
            (stats.current_size as u64) + stats.total_removed + stats.total_overflow
        );
        assert!(stats.peak_size >= stats.current_size);
    }

    #[tokio::test]
    async fn cleanup_archives_expired_entries() {
        let pool = HotPool::new(HotPoolConfig {
            max_age: Duration::from_millis(10),
            max_size: 100,
            cleanup_interval: Duration::from_secs(3600),
        });
        let archived: Arc<StdMutex<Vec<ActiveRequest>>> = Arc::new(StdMutex::new(Vec::new()));
        {
            let archived = archived.clone();
            pool.set_archive_callback(Arc::new(move |req| {
                archived.lock().unwrap().push(req);
            }));
        }

        pool.add(request("old")).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.cleanup_expired();

        let archived = archived.lock().unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].status, RequestStatus::Failed);
        assert!(archived[0].end_time.is_some());
    }
}
