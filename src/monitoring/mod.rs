//! # 运行监控模块
//!
//! 请求计数、端点维度统计与挂起请求登记。仪表盘的 `/connections`
//! 快照由这里提供。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 单端点的请求统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct EndpointMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    #[serde(skip)]
    pub total_response_time: Duration,
}

impl EndpointMetrics {
    /// 平均响应耗时
    #[must_use]
    pub fn average_response_time(&self) -> Duration {
        if self.successful_requests == 0 {
            return Duration::ZERO;
        }
        self.total_response_time / u32::try_from(self.successful_requests).unwrap_or(u32::MAX)
    }
}

/// 一个处于挂起状态的连接
#[derive(Debug, Clone, Serialize)]
pub struct SuspendedConnection {
    pub id: String,
    pub client_ip: String,
    pub method: String,
    pub path: String,
    /// 挂起前最后尝试的端点
    pub endpoint: String,
    pub suspended_at: DateTime<Utc>,
    pub retry_count: u32,
    pub user_agent: String,
}

/// 挂起请求的累计统计
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SuspendedStats {
    pub total_suspended: u64,
    pub successful_resumes: u64,
    pub timeout_count: u64,
    pub current_suspended: usize,
}

/// 全局统计快照
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: u64,
    pub requests_per_endpoint: HashMap<String, u64>,
    pub errors_per_endpoint: HashMap<String, u64>,
}

#[derive(Default)]
struct MonitoringInner {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    total_response_time: Duration,
    endpoints: HashMap<String, EndpointMetrics>,
    suspended: HashMap<String, SuspendedConnection>,
    suspended_stats: SuspendedStats,
}

/// 监控收集器
#[derive(Default)]
pub struct Monitoring {
    inner: Mutex<MonitoringInner>,
}

impl Monitoring {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次成功完成的请求
    pub fn record_success(&self, endpoint: &str, response_time: Duration) {
        let mut inner = self.lock();
        inner.total_requests += 1;
        inner.successful_requests += 1;
        inner.total_response_time += response_time;

        let metrics = inner.endpoints.entry(endpoint.to_string()).or_default();
        metrics.total_requests += 1;
        metrics.successful_requests += 1;
        metrics.total_response_time += response_time;
    }

    /// 记录一次最终失败的请求
    pub fn record_failure(&self, endpoint: &str) {
        let mut inner = self.lock();
        inner.total_requests += 1;
        inner.failed_requests += 1;

        if !endpoint.is_empty() {
            let metrics = inner.endpoints.entry(endpoint.to_string()).or_default();
            metrics.total_requests += 1;
            metrics.failed_requests += 1;
        }
    }

    /// 登记挂起连接
    pub fn add_suspended(&self, conn: SuspendedConnection) {
        let mut inner = self.lock();
        inner.suspended_stats.total_suspended += 1;
        inner.suspended.insert(conn.id.clone(), conn);
        inner.suspended_stats.current_suspended = inner.suspended.len();
    }

    /// 挂起连接恢复调度
    pub fn resume_suspended(&self, id: &str) {
        let mut inner = self.lock();
        if inner.suspended.remove(id).is_some() {
            inner.suspended_stats.successful_resumes += 1;
        }
        inner.suspended_stats.current_suspended = inner.suspended.len();
    }

    /// 挂起连接等待超时
    pub fn timeout_suspended(&self, id: &str) {
        let mut inner = self.lock();
        if inner.suspended.remove(id).is_some() {
            inner.suspended_stats.timeout_count += 1;
        }
        inner.suspended_stats.current_suspended = inner.suspended.len();
    }

    /// 当前挂起连接快照（按挂起时间排序）
    #[must_use]
    pub fn get_active_suspended_connections(&self) -> Vec<SuspendedConnection> {
        let inner = self.lock();
        let mut list: Vec<_> = inner.suspended.values().cloned().collect();
        list.sort_by_key(|c| c.suspended_at);
        list
    }

    /// 挂起统计快照
    #[must_use]
    pub fn get_suspended_stats(&self) -> SuspendedStats {
        self.lock().suspended_stats
    }

    /// 全局统计快照
    #[must_use]
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let average_response_time_ms = if inner.successful_requests == 0 {
            0
        } else {
            (inner.total_response_time.as_millis() / u128::from(inner.successful_requests)) as u64
        };

        MetricsSnapshot {
            total_requests: inner.total_requests,
            successful_requests: inner.successful_requests,
            failed_requests: inner.failed_requests,
            average_response_time_ms,
            requests_per_endpoint: inner
                .endpoints
                .iter()
                .map(|(name, m)| (name.clone(), m.total_requests))
                .collect(),
            errors_per_endpoint: inner
                .endpoints
                .iter()
                .map(|(name, m)| (name.clone(), m.failed_requests))
                .collect(),
        }
    }

    /// 端点维度统计快照
    #[must_use]
    pub fn get_endpoint_metrics(&self) -> HashMap<String, EndpointMetrics> {
        self.lock().endpoints.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitoringInner> {
        self.inner.lock().expect("monitoring lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suspended(id: &str) -> SuspendedConnection {
        SuspendedConnection {
            id: id.to_string(),
            client_ip: "127.0.0.1".to_string(),
            method: "POST".to_string(),
            path: "/v1/messages".to_string(),
            endpoint: "primary".to_string(),
            suspended_at: Utc::now(),
            retry_count: 2,
            user_agent: "test".to_string(),
        }
    }

    #[test]
    fn success_and_failure_counters() {
        let monitoring = Monitoring::new();
        monitoring.record_success("primary", Duration::from_millis(100));
        monitoring.record_success("primary", Duration::from_millis(300));
        monitoring.record_failure("backup");

        let snapshot = monitoring.get_metrics();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.successful_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.average_response_time_ms, 200);
        assert_eq!(snapshot.requests_per_endpoint["primary"], 2);
        assert_eq!(snapshot.errors_per_endpoint["backup"], 1);
    }

    #[test]
    fn suspended_lifecycle() {
        let monitoring = Monitoring::new();
        monitoring.add_suspended(suspended("req-1"));
        monitoring.add_suspended(suspended("req-2"));

        let stats = monitoring.get_suspended_stats();
        assert_eq!(stats.total_suspended, 2);
        assert_eq!(stats.current_suspended, 2);
        assert_eq!(monitoring.get_active_suspended_connections().len(), 2);

        monitoring.resume_suspended("req-1");
        monitoring.timeout_suspended("req-2");

        let stats = monitoring.get_suspended_stats();
        assert_eq!(stats.successful_resumes, 1);
        assert_eq!(stats.timeout_count, 1);
        assert_eq!(stats.current_suspended, 0);
    }

    #[test]
    fn endpoint_average_response_time() {
        let mut metrics = EndpointMetrics::default();
        assert_eq!(metrics.average_response_time(), Duration::ZERO);

        metrics.successful_requests = 2;
        metrics.total_response_time = Duration::from_millis(500);
        assert_eq!(metrics.average_response_time(), Duration::from_millis(250));
    }
}
