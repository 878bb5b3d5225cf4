//! # 应用数据目录
//!
//! 跨平台定位持久化数据的根目录：
//! - Windows: `%APPDATA%\CC-Forwarder`
//! - macOS: `~/Library/Application Support/CC-Forwarder`
//! - Linux: `$XDG_DATA_HOME/cc-forwarder` 或 `~/.local/share/cc-forwarder`
//! - 其他: `~/.cc-forwarder`

use std::env;
use std::path::PathBuf;

use crate::error::{ProxyError, Result};

fn home_dir() -> PathBuf {
    #[cfg(windows)]
    {
        env::var_os("USERPROFILE").map_or_else(|| PathBuf::from("."), PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from)
    }
}

/// 获取应用数据根目录
#[must_use]
pub fn app_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let base = env::var_os("APPDATA").map_or_else(
            || home_dir().join("AppData").join("Roaming"),
            PathBuf::from,
        );
        base.join("CC-Forwarder")
    }

    #[cfg(target_os = "macos")]
    {
        home_dir()
            .join("Library")
            .join("Application Support")
            .join("CC-Forwarder")
    }

    #[cfg(target_os = "linux")]
    {
        match env::var_os("XDG_DATA_HOME") {
            Some(xdg) if !xdg.is_empty() => PathBuf::from(xdg).join("cc-forwarder"),
            _ => home_dir().join(".local").join("share").join("cc-forwarder"),
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        home_dir().join(".cc-forwarder")
    }
}

/// 数据库目录
#[must_use]
pub fn data_dir() -> PathBuf {
    app_data_dir().join("data")
}

/// 日志目录
#[must_use]
pub fn log_dir() -> PathBuf {
    app_data_dir().join("logs")
}

/// 配置目录
#[must_use]
pub fn config_dir() -> PathBuf {
    app_data_dir().join("config")
}

/// 确保应用所需的目录全部存在（0755）
pub fn ensure_app_dirs() -> Result<()> {
    for dir in [app_data_dir(), data_dir(), log_dir(), config_dir()] {
        std::fs::create_dir_all(&dir).map_err(|e| {
            ProxyError::internal_with_source(format!("创建应用目录失败: {}", dir.display()), e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            std::fs::set_permissions(&dir, perms).map_err(|e| {
                ProxyError::internal_with_source(
                    format!("设置目录权限失败: {}", dir.display()),
                    e,
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_is_absolute_enough() {
        let dir = app_data_dir();
        let repr = dir.to_string_lossy().to_lowercase();
        assert!(repr.contains("cc-forwarder"));
    }

    #[test]
    fn sub_dirs_hang_off_root() {
        let root = app_data_dir();
        assert_eq!(data_dir(), root.join("data"));
        assert_eq!(log_dir(), root.join("logs"));
        assert_eq!(config_dir(), root.join("config"));
    }
}
