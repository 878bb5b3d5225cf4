//! 归档写入器
//!
//! 热池的归档回调只负责投递，真正的持久化由这里的后台任务完成：
//! 攒批 → `RequestStore::save_requests` → `confirm_archived`。
//! 写入失败的批次保留在待写队列，下一轮连同新条目一起重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::hot_pool::HotPool;
use super::types::ActiveRequest;
use crate::error::Result;

/// 请求归档存储（外部协作方的操作面）
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// 持久化一批已完成请求
    async fn save_requests(&self, requests: &[ActiveRequest]) -> Result<()>;
}

/// 进程内存实现，用于默认装配与测试
#[derive(Default)]
pub struct MemoryRequestStore {
    records: tokio::sync::RwLock<Vec<ActiveRequest>>,
}

impl MemoryRequestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 已持久化的请求数
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// 全部已持久化请求的快照
    pub async fn all(&self) -> Vec<ActiveRequest> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn save_requests(&self, requests: &[ActiveRequest]) -> Result<()> {
        let mut records = self.records.write().await;
        records.extend_from_slice(requests);
        Ok(())
    }
}

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const MAX_BATCH: usize = 100;

/// 挂接热池与存储：注册归档回调并启动后台写入任务
pub fn spawn_archive_writer(
    pool: &Arc<HotPool>,
    store: Arc<dyn RequestStore>,
    cancel: CancellationToken,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ActiveRequest>();

    pool.set_archive_callback(Arc::new(move |req| {
        // 写入端关闭后丢弃即可，热池自身的归档缓存仍保留条目
        let _ = tx.send(req);
    }));

    let pool = Arc::clone(pool);
    tokio::spawn(async move {
        let mut pending: Vec<ActiveRequest> = Vec::new();
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    match maybe {
                        Some(req) => {
                            pending.push(req);
                            if pending.len() >= MAX_BATCH {
                                flush(&store, &pool, &mut pending).await;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => flush(&store, &pool, &mut pending).await,
                () = cancel.cancelled() => break,
            }
        }

        // 退出前尽力把剩余批次写完
        while let Ok(req) = rx.try_recv() {
            pending.push(req);
        }
        flush(&store, &pool, &mut pending).await;
    });
}

async fn flush(store: &Arc<dyn RequestStore>, pool: &Arc<HotPool>, pending: &mut Vec<ActiveRequest>) {
    if pending.is_empty() {
        return;
    }

    match store.save_requests(pending).await {
        Ok(()) => {
            let ids: Vec<String> = pending.iter().map(|r| r.request_id.clone()).collect();
            pool.confirm_archived(&ids);
            tracing::debug!("归档写入完成: {} 条", ids.len());
            pending.clear();
        }
        Err(err) => {
            // 保留待写批次，下一轮重试；热池归档缓存兜底
            tracing::error!("归档写入失败，稍后重试: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::hot_pool::HotPoolConfig;
    use crate::tracking::types::RequestStatus;

    #[tokio::test]
    async fn archive_flow_confirms_pool_entries() {
        let pool = HotPool::new(HotPoolConfig::default());
        let store = Arc::new(MemoryRequestStore::new());
        let cancel = CancellationToken::new();
        spawn_archive_writer(&pool, store.clone(), cancel.clone());

        pool.add(ActiveRequest::new(
            "req-a1", "127.0.0.1", "ua", "POST", "/v1/messages", false,
        ))
        .unwrap();
        pool.complete_and_archive("req-a1", |r| r.status = RequestStatus::Completed)
            .unwrap();

        // 等待批量写入周期
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(store.count().await, 1);
        assert_eq!(pool.get_archiving_count(), 0);
        assert_eq!(pool.get_active_count(), 0);
        cancel.cancel();
    }
}
