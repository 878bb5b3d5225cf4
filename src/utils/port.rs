//! # 端口探测工具
//!
//! 从首选端口开始递增探测，找到第一个可绑定的端口。

use std::net::TcpListener;

use crate::error::{ProxyError, Result};

/// 端口信息快照
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PortInfo {
    /// 用户设置的首选端口
    pub preferred_port: u16,
    /// 实际使用的端口
    pub actual_port: u16,
    /// 首选端口是否被占用
    pub was_occupied: bool,
}

/// 检查端口是否可用
#[must_use]
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

/// 从首选端口开始查找可用端口
///
/// `max_attempts` 为最多尝试次数（<= 0 时取默认值 10）。若首选端口被占用
/// 并成功落到后续端口，会记录一条 WARN 日志。
pub fn find_available_port(preferred: u16, max_attempts: u16) -> Result<u16> {
    let attempts = if max_attempts == 0 { 10 } else { max_attempts };

    for i in 0..attempts {
        let port = preferred.saturating_add(i);
        if is_port_available(port) {
            if i > 0 {
                tracing::warn!("⚠️ 端口 {preferred} 被占用，自动使用端口 {port}");
            }
            return Ok(port);
        }
    }

    Err(ProxyError::server_init(format!(
        "无法找到可用端口 (尝试范围: {}-{})",
        preferred,
        preferred.saturating_add(attempts - 1)
    )))
}

/// 查找可用端口并返回端口信息
pub fn find_port_info(preferred: u16, max_attempts: u16) -> Result<PortInfo> {
    let actual = find_available_port(preferred, max_attempts)?;
    Ok(PortInfo {
        preferred_port: preferred,
        actual_port: actual,
        was_occupied: actual != preferred,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_free_port_from_preferred() {
        // 端口 0 不参与探测，先占住一个具体端口
        let holder = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let held = holder.local_addr().unwrap().port();

        let found = find_available_port(held, 10).unwrap();
        assert_ne!(found, held);
        assert!(found > held);
        assert!(found < held + 10);
    }

    #[test]
    fn reports_occupied_flag() {
        let holder = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let held = holder.local_addr().unwrap().port();

        let info = find_port_info(held, 10).unwrap();
        assert_eq!(info.preferred_port, held);
        assert!(info.was_occupied);
    }

    #[test]
    fn exhausted_range_is_an_error() {
        // 占住连续 3 个端口后只允许尝试这 3 个
        let base = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let start = base.local_addr().unwrap().port();
        let _h1 = TcpListener::bind(("0.0.0.0", start + 1));
        let _h2 = TcpListener::bind(("0.0.0.0", start + 2));

        // 端口 start 一定被占用；start+1/start+2 大概率也被占住。
        // 仅断言 start 自身占用时 max_attempts=1 必然失败。
        let err = find_available_port(start, 1).unwrap_err();
        assert!(err.to_string().contains("无法找到可用端口"));
    }
}
