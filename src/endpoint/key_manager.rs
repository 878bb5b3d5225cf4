//! 端点凭证游标管理
//!
//! 每个端点可配置多个 Bearer Token 与多个 API Key，这里维护各端点
//! 当前生效凭证的索引。所有方法在同一把读写锁下工作，读路径走读锁。

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::{ProxyError, Result};

/// 单个端点的凭证游标状态
#[derive(Debug, Clone, serde::Serialize)]
pub struct EndpointKeyState {
    pub endpoint_name: String,
    pub token_count: usize,
    pub api_key_count: usize,
    pub active_token_index: usize,
    pub active_api_key_index: usize,
    pub last_switch_time: Option<DateTime<Utc>>,
}

/// 凭证游标管理器
#[derive(Default)]
pub struct KeyManager {
    states: RwLock<HashMap<String, EndpointKeyState>>,
}

impl KeyManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记端点的凭证数量；重复调用不会重置已有游标
    pub fn init_endpoint(&self, name: &str, token_count: usize, api_key_count: usize) {
        let mut states = self.write();
        states
            .entry(name.to_string())
            .or_insert_with(|| EndpointKeyState {
                endpoint_name: name.to_string(),
                token_count,
                api_key_count,
                active_token_index: 0,
                active_api_key_index: 0,
                last_switch_time: None,
            });
    }

    /// 切换端点的生效 Token
    pub fn switch_token(&self, name: &str, index: usize) -> Result<()> {
        let mut states = self.write();
        let Some(state) = states.get_mut(name) else {
            return Err(ProxyError::not_found("端点", name));
        };
        if index >= state.token_count {
            return Err(ProxyError::conflict(format!(
                "Token 索引越界: {index} (共 {} 个)",
                state.token_count
            )));
        }
        state.active_token_index = index;
        state.last_switch_time = Some(Utc::now());
        Ok(())
    }

    /// 切换端点的生效 API Key
    pub fn switch_api_key(&self, name: &str, index: usize) -> Result<()> {
        let mut states = self.write();
        let Some(state) = states.get_mut(name) else {
            return Err(ProxyError::not_found("端点", name));
        };
        if index >= state.api_key_count {
            return Err(ProxyError::conflict(format!(
                "API Key 索引越界: {index} (共 {} 个)",
                state.api_key_count
            )));
        }
        state.active_api_key_index = index;
        state.last_switch_time = Some(Utc::now());
        Ok(())
    }

    /// 轮换到下一个 Token（`(idx + 1) % count`），返回新索引
    pub fn advance_token(&self, name: &str) -> Result<usize> {
        let mut states = self.write();
        let Some(state) = states.get_mut(name) else {
            return Err(ProxyError::not_found("端点", name));
        };
        if state.token_count == 0 {
            return Err(ProxyError::conflict(format!("端点 {name} 未配置 Token")));
        }
        state.active_token_index = (state.active_token_index + 1) % state.token_count;
        state.last_switch_time = Some(Utc::now());
        Ok(state.active_token_index)
    }

    /// 轮换到下一个 API Key，返回新索引
    pub fn advance_api_key(&self, name: &str) -> Result<usize> {
        let mut states = self.write();
        let Some(state) = states.get_mut(name) else {
            return Err(ProxyError::not_found("端点", name));
        };
        if state.api_key_count == 0 {
            return Err(ProxyError::conflict(format!("端点 {name} 未配置 API Key")));
        }
        state.active_api_key_index = (state.active_api_key_index + 1) % state.api_key_count;
        state.last_switch_time = Some(Utc::now());
        Ok(state.active_api_key_index)
    }

    /// 当前生效 Token 索引；未知端点按 0 处理
    #[must_use]
    pub fn get_active_token_index(&self, name: &str) -> usize {
        self.read()
            .get(name)
            .map_or(0, |s| s.active_token_index)
    }

    /// 当前生效 API Key 索引；未知端点按 0 处理
    #[must_use]
    pub fn get_active_api_key_index(&self, name: &str) -> usize {
        self.read()
            .get(name)
            .map_or(0, |s| s.active_api_key_index)
    }

    /// 单个端点的状态快照
    #[must_use]
    pub fn get_endpoint_key_state(&self, name: &str) -> Option<EndpointKeyState> {
        self.read().get(name).cloned()
    }

    /// 全部端点的状态快照
    #[must_use]
    pub fn get_all_states(&self) -> HashMap<String, EndpointKeyState> {
        self.read().clone()
    }

    /// 是否配置了多个 Token
    #[must_use]
    pub fn has_multiple_tokens(&self, name: &str) -> bool {
        self.read().get(name).is_some_and(|s| s.token_count > 1)
    }

    /// 凭证数量变化时同步；当前索引越界则重置为 0；端点不存在时新建
    pub fn update_endpoint_key_count(&self, name: &str, token_count: usize, api_key_count: usize) {
        let mut states = self.write();
        let state = states
            .entry(name.to_string())
            .or_insert_with(|| EndpointKeyState {
                endpoint_name: name.to_string(),
                token_count,
                api_key_count,
                active_token_index: 0,
                active_api_key_index: 0,
                last_switch_time: None,
            });
        state.token_count = token_count;
        state.api_key_count = api_key_count;
        if state.active_token_index >= token_count {
            state.active_token_index = 0;
        }
        if state.active_api_key_index >= api_key_count {
            state.active_api_key_index = 0;
        }
    }

    /// 移除端点状态
    pub fn remove_endpoint(&self, name: &str) {
        self.write().remove(name);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, EndpointKeyState>> {
        self.states.read().expect("key manager lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, EndpointKeyState>> {
        self.states.write().expect("key manager lock poisoned")
    }
}

/// 凭证脱敏：长度不超过 8 时全遮蔽，否则保留首尾各 4 个字符
#[must_use]
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn init_endpoint_defaults() {
        let km = KeyManager::new();
        km.init_endpoint("test-endpoint", 3, 2);

        assert_eq!(km.get_active_token_index("test-endpoint"), 0);
        assert_eq!(km.get_active_api_key_index("test-endpoint"), 0);
        // 未知端点按 0 处理
        assert_eq!(km.get_active_token_index("non-existent"), 0);
    }

    #[test]
    fn init_is_idempotent() {
        let km = KeyManager::new();
        km.init_endpoint("ep", 3, 2);
        km.switch_token("ep", 2).unwrap();
        km.init_endpoint("ep", 3, 2);
        assert_eq!(km.get_active_token_index("ep"), 2);
    }

    #[test]
    fn switch_token_in_range() {
        let km = KeyManager::new();
        km.init_endpoint("test-endpoint", 3, 2);

        km.switch_token("test-endpoint", 1).unwrap();
        assert_eq!(km.get_active_token_index("test-endpoint"), 1);
        km.switch_token("test-endpoint", 2).unwrap();
        assert_eq!(km.get_active_token_index("test-endpoint"), 2);
        km.switch_token("test-endpoint", 0).unwrap();
        assert_eq!(km.get_active_token_index("test-endpoint"), 0);
    }

    #[test]
    fn switch_token_out_of_range_or_unknown() {
        let km = KeyManager::new();
        km.init_endpoint("test-endpoint", 3, 2);

        assert!(km.switch_token("test-endpoint", 5).is_err());
        assert!(km.switch_token("non-existent", 0).is_err());
    }

    #[test]
    fn switch_api_key() {
        let km = KeyManager::new();
        km.init_endpoint("test-endpoint", 3, 2);

        km.switch_api_key("test-endpoint", 1).unwrap();
        assert_eq!(km.get_active_api_key_index("test-endpoint"), 1);
        assert!(km.switch_api_key("test-endpoint", 3).is_err());
    }

    #[test]
    fn advance_wraps_around() {
        let km = KeyManager::new();
        km.init_endpoint("ep", 2, 1);

        assert_eq!(km.advance_token("ep").unwrap(), 1);
        assert_eq!(km.advance_token("ep").unwrap(), 0);
        assert_eq!(km.advance_api_key("ep").unwrap(), 0);
    }

    #[test]
    fn key_state_snapshot() {
        let km = KeyManager::new();
        km.init_endpoint("test-endpoint", 3, 2);
        km.switch_token("test-endpoint", 1).unwrap();

        let state = km.get_endpoint_key_state("test-endpoint").unwrap();
        assert_eq!(state.endpoint_name, "test-endpoint");
        assert_eq!(state.active_token_index, 1);
        assert_eq!(state.token_count, 3);
        assert_eq!(state.api_key_count, 2);
        assert!(state.last_switch_time.is_some());

        assert!(km.get_endpoint_key_state("non-existent").is_none());
    }

    #[test]
    fn all_states() {
        let km = KeyManager::new();
        km.init_endpoint("endpoint1", 2, 1);
        km.init_endpoint("endpoint2", 3, 2);

        let states = km.get_all_states();
        assert_eq!(states.len(), 2);
        assert!(states.contains_key("endpoint1"));
        assert!(states.contains_key("endpoint2"));
    }

    #[test]
    fn has_multiple_tokens() {
        let km = KeyManager::new();
        km.init_endpoint("single", 1, 1);
        km.init_endpoint("multi", 3, 1);

        assert!(!km.has_multiple_tokens("single"));
        assert!(km.has_multiple_tokens("multi"));
        assert!(!km.has_multiple_tokens("non-existent"));
    }

    #[test]
    fn count_shrink_resets_index() {
        let km = KeyManager::new();
        km.init_endpoint("test-endpoint", 3, 2);
        km.switch_token("test-endpoint", 2).unwrap();

        km.update_endpoint_key_count("test-endpoint", 2, 2);
        assert_eq!(km.get_active_token_index("test-endpoint"), 0);

        // 更新不存在的端点会新建状态
        km.update_endpoint_key_count("new-endpoint", 5, 3);
        assert_eq!(km.get_active_token_index("new-endpoint"), 0);
    }

    #[test]
    fn remove_endpoint() {
        let km = KeyManager::new();
        km.init_endpoint("test-endpoint", 3, 2);
        km.remove_endpoint("test-endpoint");
        assert!(km.get_endpoint_key_state("test-endpoint").is_none());
    }

    #[test]
    fn concurrent_switches_keep_state_valid() {
        let km = Arc::new(KeyManager::new());
        km.init_endpoint("test-endpoint", 10, 10);

        let mut handles = Vec::new();
        for i in 0..100 {
            let km = km.clone();
            handles.push(std::thread::spawn(move || {
                let _ = km.switch_token("test-endpoint", i % 10);
                let _ = km.switch_api_key("test-endpoint", (i * 3) % 10);
                let _ = km.get_active_token_index("test-endpoint");
                let _ = km.get_endpoint_key_state("test-endpoint");
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let state = km.get_endpoint_key_state("test-endpoint").unwrap();
        assert!(state.active_token_index < 10);
        assert!(state.active_api_key_index < 10);
    }

    #[test]
    fn mask_key_pinned_outputs() {
        assert_eq!(mask_key("short"), "****");
        assert_eq!(mask_key("12345678"), "****");
        assert_eq!(mask_key("123456789"), "1234****6789");
        assert_eq!(mask_key("sk-ant-api03-xxx"), "sk-a****-xxx");
        assert_eq!(mask_key("sk-very-long-api-key-value"), "sk-v****alue");
    }
}
