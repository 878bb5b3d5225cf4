//! 日志事件批量推送
//!
//! 面向仪表盘的实时通道：日志先进入缓冲区，满批立即发送，未满批由
//! 定时器按固定间隔刷出。`stop` 幂等，停止时刷出残余日志。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::LogEntry;

/// 推送事件名，与仪表盘订阅的频道一致
pub const LOG_BATCH_EVENT: &str = "log:batch";

/// 批量日志的出口（仪表盘事件传输层的边界）
pub trait LogEventSink: Send + Sync {
    /// 发送一批日志
    fn emit_batch(&self, event: &str, entries: &[LogEntry]);
}

struct BatcherInner {
    buffer: Vec<LogEntry>,
    enabled: bool,
    stopped: bool,
    cancel: Option<CancellationToken>,
}

/// 日志事件批量发射器
pub struct EventBatcher {
    batch_size: usize,
    flush_interval: Duration,
    sink: Arc<dyn LogEventSink>,
    inner: Arc<Mutex<BatcherInner>>,
}

impl EventBatcher {
    /// 默认配置：每批最多 10 条，100ms 刷新一次
    #[must_use]
    pub fn new(sink: Arc<dyn LogEventSink>) -> Self {
        Self::with_config(sink, 10, Duration::from_millis(100))
    }

    #[must_use]
    pub fn with_config(
        sink: Arc<dyn LogEventSink>,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            flush_interval,
            sink,
            inner: Arc::new(Mutex::new(BatcherInner {
                buffer: Vec::with_capacity(batch_size),
                enabled: false,
                stopped: false,
                cancel: None,
            })),
        }
    }

    /// 启动批量发送循环（仪表盘订阅后调用）；重复调用无效果
    pub fn start(&self) {
        let mut inner = self.lock();
        if inner.enabled {
            return;
        }
        inner.enabled = true;
        inner.stopped = false;

        let cancel = CancellationToken::new();
        inner.cancel = Some(cancel.clone());
        drop(inner);

        let shared = Arc::clone(&self.inner);
        let sink = Arc::clone(&self.sink);
        let interval = self.flush_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let mut inner = shared.lock().expect("event batcher lock poisoned");
                        flush_buffer(&sink, &mut inner);
                    }
                    () = cancel.cancelled() => return,
                }
            }
        });
    }

    /// 停止发射器并刷出残余日志；幂等
    pub fn stop(&self) {
        let mut inner = self.lock();
        if !inner.enabled || inner.stopped {
            return;
        }
        inner.enabled = false;
        inner.stopped = true;
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        flush_buffer(&self.sink, &mut inner);
    }

    /// 发射一条日志事件；缓冲区满批时立即刷出
    pub fn emit(&self, entry: LogEntry) {
        let mut inner = self.lock();
        if !inner.enabled {
            return;
        }
        inner.buffer.push(entry);
        if inner.buffer.len() >= self.batch_size {
            flush_buffer(&self.sink, &mut inner);
        }
    }

    /// 是否处于启用状态
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BatcherInner> {
        self.inner.lock().expect("event batcher lock poisoned")
    }
}

fn flush_buffer(sink: &Arc<dyn LogEventSink>, inner: &mut BatcherInner) {
    if inner.buffer.is_empty() {
        return;
    }
    sink.emit_batch(LOG_BATCH_EVENT, &inner.buffer);
    inner.buffer.clear();
}
