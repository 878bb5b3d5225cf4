//! 通用工具模块

pub mod appdir;
pub mod event_stream;
pub mod port;

use std::time::Duration;

/// 把响应耗时格式化为人类可读字符串（`3ms` / `1.25s`）
#[must_use]
pub fn format_response_time(d: Duration) -> String {
    if d.is_zero() {
        return "0ms".to_string();
    }
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

/// 把运行时长格式化为 `1h2m3s` 风格
#[must_use]
pub fn format_uptime(d: Duration) -> String {
    let total = d.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
