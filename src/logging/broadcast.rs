//! 日志广播处理器
//!
//! 拦截每条结构化日志并三路分发：
//! 1. 写入日志文件（失败向上传播）
//! 2. 写入环形缓冲区（供历史查询）
//! 3. 推给事件批量发射器（仪表盘实时通道）
//!
//! `BroadcastLayer` 是挂接到 `tracing` 订阅链上的适配层，真正的分发
//! 逻辑在框架无关的 `BroadcastHandler` 上，便于单测直接驱动。

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use super::event_batcher::EventBatcher;
use super::ring_buffer::RingBuffer;
use crate::error::{ProxyError, Result};

/// 一条结构化的日志记录（对外序列化格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC3339 时间戳
    pub timestamp: String,
    /// DEBUG / INFO / WARN / ERROR
    pub level: String,
    /// 日志消息
    pub message: String,
    /// 附加属性（request_id 等）
    pub attrs: HashMap<String, String>,
}

/// 进入广播处理器前的原始记录
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub attrs: Vec<(String, String)>,
}

/// 日志广播处理器
pub struct BroadcastHandler {
    file: Arc<Mutex<Box<dyn Write + Send>>>,
    min_level: Level,
    ring: Arc<RingBuffer>,
    emitter: Arc<RwLock<Option<Arc<EventBatcher>>>>,
    base_attrs: Vec<(String, String)>,
    groups: Vec<String>,
}

impl BroadcastHandler {
    /// 创建广播处理器：`file` 为日志文件写入端，`buffer_size` 为环形缓冲容量
    #[must_use]
    pub fn new(file: Box<dyn Write + Send>, buffer_size: usize) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
            min_level: Level::DEBUG,
            ring: Arc::new(RingBuffer::new(buffer_size)),
            emitter: Arc::new(RwLock::new(None)),
            base_attrs: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// 设置最低广播级别（文件始终写入，环形缓冲与事件通道按级别过滤）
    #[must_use]
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// 设置事件发射器（仪表盘启动后调用，允许并发日志投递期间热插）
    pub fn set_event_emitter(&self, emitter: Arc<EventBatcher>) {
        let mut guard = self.emitter.write().expect("emitter lock poisoned");
        *guard = Some(emitter);
    }

    /// 处理一条记录
    pub fn handle(&self, record: &LogRecord) -> Result<()> {
        let entry = self.build_entry(record);

        // 1. 先写文件，失败向上传播
        self.write_file_line(&entry)?;

        // 2. 级别过滤（tracing 的 Level 排序与详细程度一致，ERROR 最小）
        if record.level > self.min_level {
            return Ok(());
        }

        // 3. 写入环形缓冲区
        self.ring.add(entry.clone());

        // 4. 推给事件发射器（未挂接时静默跳过）
        let emitter = {
            let guard = self.emitter.read().expect("emitter lock poisoned");
            guard.clone()
        };
        if let Some(emitter) = emitter {
            emitter.emit(entry);
        }

        Ok(())
    }

    /// 取最近的 N 条日志
    #[must_use]
    pub fn get_recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        self.ring.get_recent(limit)
    }

    /// 环形缓冲区句柄（供管理接口查询）
    #[must_use]
    pub fn ring(&self) -> Arc<RingBuffer> {
        Arc::clone(&self.ring)
    }

    /// 派生一个附带固定属性的处理器；环形缓冲与发射器与原处理器共享
    #[must_use]
    pub fn with_attrs(&self, attrs: Vec<(String, String)>) -> Self {
        let mut base = self.base_attrs.clone();
        base.extend(attrs);
        Self {
            file: Arc::clone(&self.file),
            min_level: self.min_level,
            ring: Arc::clone(&self.ring),
            emitter: Arc::clone(&self.emitter),
            base_attrs: base,
            groups: self.groups.clone(),
        }
    }

    /// 派生一个属性分组处理器；后续属性键带上 `group.` 前缀
    #[must_use]
    pub fn with_group(&self, name: &str) -> Self {
        let mut groups = self.groups.clone();
        groups.push(name.to_string());
        Self {
            file: Arc::clone(&self.file),
            min_level: self.min_level,
            ring: Arc::clone(&self.ring),
            emitter: Arc::clone(&self.emitter),
            base_attrs: self.base_attrs.clone(),
            groups,
        }
    }

    fn build_entry(&self, record: &LogRecord) -> LogEntry {
        let mut attrs = HashMap::with_capacity(self.base_attrs.len() + record.attrs.len());
        for (k, v) in &self.base_attrs {
            attrs.insert(k.clone(), v.clone());
        }
        let prefix = if self.groups.is_empty() {
            String::new()
        } else {
            format!("{}.", self.groups.join("."))
        };
        for (k, v) in &record.attrs {
            attrs.insert(format!("{prefix}{k}"), v.clone());
        }

        LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            level: record.level.to_string().to_uppercase(),
            message: record.message.clone(),
            attrs,
        }
    }

    fn write_file_line(&self, entry: &LogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)
            .map_err(|e| ProxyError::internal_with_source("日志序列化失败", e))?;
        let mut file = self.file.lock().expect("file sink lock poisoned");
        writeln!(file, "{line}")
            .map_err(|e| ProxyError::internal_with_source("日志文件写入失败", e))?;
        Ok(())
    }
}

/// `tracing` 订阅链上的广播适配层
pub struct BroadcastLayer {
    handler: Arc<BroadcastHandler>,
}

impl BroadcastLayer {
    #[must_use]
    pub fn new(handler: Arc<BroadcastHandler>) -> Self {
        Self { handler }
    }
}

impl<S: Subscriber> Layer<S> for BroadcastLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord {
            level: *event.metadata().level(),
            message: visitor.message,
            attrs: visitor.attrs,
        };

        if let Err(err) = self.handler.handle(&record) {
            // 广播失败不能再走日志链路，降级到 stderr
            eprintln!("log broadcast failed: {err}");
        }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    attrs: Vec<(String, String)>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.attrs.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.attrs
                .push((field.name().to_string(), format!("{value:?}")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn record(level: Level, message: &str) -> LogRecord {
        LogRecord {
            level,
            message: message.to_string(),
            attrs: vec![("request_id".to_string(), "req-1".to_string())],
        }
    }

    #[test]
    fn records_flow_to_ring() {
        let handler = BroadcastHandler::new(Box::new(io::sink()), 16);
        handler.handle(&record(Level::INFO, "hello")).unwrap();
        handler.handle(&record(Level::WARN, "careful")).unwrap();

        let recent = handler.get_recent_logs(0);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "hello");
        assert_eq!(recent[0].level, "INFO");
        assert_eq!(recent[1].level, "WARN");
        assert_eq!(recent[0].attrs.get("request_id").unwrap(), "req-1");
    }

    #[test]
    fn min_level_filters_ring_but_not_file() {
        let handler =
            BroadcastHandler::new(Box::new(io::sink()), 16).with_min_level(Level::INFO);
        handler.handle(&record(Level::DEBUG, "noise")).unwrap();
        handler.handle(&record(Level::ERROR, "boom")).unwrap();

        let recent = handler.get_recent_logs(0);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "boom");
    }

    #[test]
    fn file_write_failure_propagates() {
        struct FailingWriter;
        impl Write for FailingWriter {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let handler = BroadcastHandler::new(Box::new(FailingWriter), 16);
        let err = handler.handle(&record(Level::INFO, "x")).unwrap_err();
        assert!(err.to_string().contains("日志文件写入失败"));
        // 文件失败时不进入环形缓冲
        assert!(handler.get_recent_logs(0).is_empty());
    }

    #[test]
    fn with_attrs_shares_ring_and_emitter() {
        let handler = BroadcastHandler::new(Box::new(io::sink()), 16);
        let derived = handler.with_attrs(vec![("component".to_string(), "group".to_string())]);

        derived.handle(&record(Level::INFO, "from child")).unwrap();

        // 父处理器能看到子处理器写入的记录
        let recent = handler.get_recent_logs(0);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].attrs.get("component").unwrap(), "group");
    }

    #[test]
    fn with_group_prefixes_record_attrs() {
        let handler = BroadcastHandler::new(Box::new(io::sink()), 16);
        let derived = handler.with_group("dispatch");
        derived.handle(&record(Level::INFO, "grouped")).unwrap();

        let recent = handler.get_recent_logs(0);
        assert!(recent[0].attrs.contains_key("dispatch.request_id"));
    }

    #[test]
    fn emitter_can_be_attached_late() {
        use super::super::event_batcher::{LogEventSink, LOG_BATCH_EVENT};
        use std::sync::Mutex as StdMutex;

        #[derive(Default)]
        struct CountingSink {
            count: StdMutex<usize>,
        }
        impl LogEventSink for CountingSink {
            fn emit_batch(&self, event: &str, entries: &[LogEntry]) {
                assert_eq!(event, LOG_BATCH_EVENT);
                *self.count.lock().unwrap() += entries.len();
            }
        }

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = rt.enter();

        let handler = BroadcastHandler::new(Box::new(io::sink()), 16);
        // 未挂接发射器时不报错
        handler.handle(&record(Level::INFO, "pre")).unwrap();

        let sink = Arc::new(CountingSink::default());
        let batcher = Arc::new(EventBatcher::with_config(
            sink.clone(),
            1,
            std::time::Duration::from_secs(3600),
        ));
        batcher.start();
        handler.set_event_emitter(batcher);

        handler.handle(&record(Level::INFO, "post")).unwrap();
        assert_eq!(*sink.count.lock().unwrap(), 1);
    }
}
