//! 环形缓冲区，保存最近的 N 条日志
//!
//! 固定大小、自动覆盖最旧数据，O(1) 写入，快照式读取。

use std::sync::RwLock;

use super::LogEntry;

struct RingInner {
    logs: Vec<Option<LogEntry>>,
    position: usize,
    count: usize,
}

/// 线程安全的日志环形缓冲区
pub struct RingBuffer {
    size: usize,
    inner: RwLock<RingInner>,
}

impl RingBuffer {
    /// 创建指定大小的环形缓冲区（`size == 0` 时取默认 1000 条）
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = if size == 0 { 1000 } else { size };
        Self {
            size,
            inner: RwLock::new(RingInner {
                logs: (0..size).map(|_| None).collect(),
                position: 0,
                count: 0,
            }),
        }
    }

    /// 追加一条日志（覆盖最旧的）
    pub fn add(&self, entry: LogEntry) {
        let mut inner = self.inner.write().expect("ring buffer lock poisoned");
        let pos = inner.position;
        inner.logs[pos] = Some(entry);
        inner.position = (pos + 1) % self.size;
        if inner.count < self.size {
            inner.count += 1;
        }
    }

    /// 按时间顺序取最近的 `limit` 条日志（`limit == 0` 或超出存量时取全部）
    #[must_use]
    pub fn get_recent(&self, limit: usize) -> Vec<LogEntry> {
        let inner = self.inner.read().expect("ring buffer lock poisoned");

        let limit = if limit == 0 || limit > inner.count {
            inner.count
        } else {
            limit
        };

        let mut result = Vec::with_capacity(limit);
        // 从最旧的有效日志开始循环读取
        let start = (inner.position + self.size - limit) % self.size;
        for i in 0..limit {
            let idx = (start + i) % self.size;
            if let Some(entry) = &inner.logs[idx] {
                result.push(entry.clone());
            }
        }
        result
    }

    /// 取出全部日志
    #[must_use]
    pub fn get_all(&self) -> Vec<LogEntry> {
        self.get_recent(0)
    }

    /// 当前存量
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().expect("ring buffer lock poisoned").count
    }

    /// 清空缓冲区
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("ring buffer lock poisoned");
        inner.position = 0;
        inner.count = 0;
    }
}
