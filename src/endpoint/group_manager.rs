//! 组管理器
//!
//! 端点按组组织（当前架构一端点一组，组名即端点名），组是失败转移与
//! 激活/冷却/暂停语义的作用粒度。全部状态变更在单把互斥锁下完成，
//! 对外只暴露快照。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tokio::sync::Notify;

use crate::error::{ProxyError, Result};

/// 组内端点条目（来自端点目录的快照）
#[derive(Debug, Clone)]
pub struct GroupEndpoint {
    pub name: String,
    pub priority: u32,
    pub healthy: bool,
}

/// 重建组目录时的端点快照
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    pub name: String,
    pub priority: u32,
    pub group_priority: u32,
    pub healthy: bool,
}

/// 一个失败转移组
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub priority: u32,
    pub endpoints: Vec<GroupEndpoint>,

    pub is_active: bool,
    pub manually_paused: bool,
    pub pause_until: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub forced_activation: bool,
    pub forced_activation_time: Option<DateTime<Utc>>,
}

impl Group {
    /// 健康端点数
    #[must_use]
    pub fn healthy_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.healthy).count()
    }

    /// 冷却是否仍然生效
    #[must_use]
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    /// 暂停是否仍然生效（0 时长的暂停为无限期）
    #[must_use]
    pub fn pause_in_effect(&self, now: DateTime<Utc>) -> bool {
        if !self.manually_paused {
            return false;
        }
        match self.pause_until {
            Some(until) => until > now,
            None => true,
        }
    }
}

/// 单个组的管理视图
#[derive(Debug, Clone, serde::Serialize)]
pub struct GroupDetail {
    pub name: String,
    pub priority: u32,
    pub is_active: bool,
    pub manually_paused: bool,
    pub forced_activation: bool,
    /// `normal` 或 `forced`
    pub activation_type: String,
    pub healthy_endpoints: usize,
    pub total_endpoints: usize,
    pub can_force_activate: bool,
    /// 冷却剩余秒数，无冷却时为 0
    pub cooldown_remaining: u64,
    /// 强制激活时间（RFC3339），未强制激活时为空串
    pub forced_activation_time: String,
}

/// 组目录管理器
pub struct GroupManager {
    cooldown: Duration,
    allow_multiple_active: bool,
    groups: Mutex<HashMap<String, Group>>,
    /// 组激活 / 端点恢复的广播源，挂起请求据此重入调度
    recovery_notify: Arc<Notify>,
}

impl GroupManager {
    #[must_use]
    pub fn new(cooldown: std::time::Duration, allow_multiple_active: bool) -> Self {
        Self {
            cooldown: Duration::from_std(cooldown).unwrap_or_else(|_| Duration::seconds(600)),
            allow_multiple_active,
            groups: Mutex::new(HashMap::new()),
            recovery_notify: Arc::new(Notify::new()),
        }
    }

    /// 挂起请求订阅的唤醒源
    #[must_use]
    pub fn recovery_notify(&self) -> Arc<Notify> {
        Arc::clone(&self.recovery_notify)
    }

    /// 从端点目录重建组：保留仍存在组的运行期状态，丢弃已消失的组。
    /// 没有任何活跃组时自动激活优先级最高且有健康端点的组。
    pub fn update_groups(&self, endpoints: &[EndpointSnapshot]) {
        let mut groups = self.lock();

        let mut rebuilt: HashMap<String, Group> = HashMap::with_capacity(endpoints.len());
        for snapshot in endpoints {
            // 一端点一组：组名即端点名
            let entry = rebuilt
                .entry(snapshot.name.clone())
                .or_insert_with(|| Group {
                    name: snapshot.name.clone(),
                    priority: snapshot.group_priority,
                    endpoints: Vec::new(),
                    is_active: false,
                    manually_paused: false,
                    pause_until: None,
                    cooldown_until: None,
                    forced_activation: false,
                    forced_activation_time: None,
                });
            entry.priority = snapshot.group_priority;
            entry.endpoints.push(GroupEndpoint {
                name: snapshot.name.clone(),
                priority: snapshot.priority,
                healthy: snapshot.healthy,
            });
        }
        for group in rebuilt.values_mut() {
            group.endpoints.sort_by_key(|e| e.priority);
            // 运行期状态从旧目录继承
            if let Some(previous) = groups.get(&group.name) {
                group.is_active = previous.is_active;
                group.manually_paused = previous.manually_paused;
                group.pause_until = previous.pause_until;
                group.cooldown_until = previous.cooldown_until;
                group.forced_activation = previous.forced_activation;
                group.forced_activation_time = previous.forced_activation_time;
            }
        }

        *groups = rebuilt;
        Self::auto_activate_locked(&mut groups);
    }

    /// 全部组的快照
    #[must_use]
    pub fn get_all_groups(&self) -> Vec<Group> {
        let mut list: Vec<Group> = self.lock().values().cloned().collect();
        list.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.name.cmp(&b.name)));
        list
    }

    /// 活跃组快照（按组优先级排序）
    #[must_use]
    pub fn get_active_groups(&self) -> Vec<Group> {
        self.get_all_groups()
            .into_iter()
            .filter(|g| g.is_active)
            .collect()
    }

    /// 单个组的快照
    #[must_use]
    pub fn get_group(&self, name: &str) -> Option<Group> {
        self.lock().get(name).cloned()
    }

    /// 管理视图：每组的激活/冷却/强制激活摘要
    #[must_use]
    pub fn get_group_details(&self) -> Vec<GroupDetail> {
        let now = Utc::now();
        self.get_all_groups()
            .into_iter()
            .map(|group| {
                let healthy = group.healthy_count();
                let in_cooldown = group.in_cooldown(now);
                let cooldown_remaining = group
                    .cooldown_until
                    .filter(|until| *until > now)
                    .map_or(0, |until| (until - now).num_seconds().max(0) as u64);
                GroupDetail {
                    name: group.name.clone(),
                    priority: group.priority,
                    is_active: group.is_active,
                    manually_paused: group.manually_paused,
                    forced_activation: group.forced_activation,
                    activation_type: if group.forced_activation {
                        "forced".to_string()
                    } else {
                        "normal".to_string()
                    },
                    healthy_endpoints: healthy,
                    total_endpoints: group.endpoints.len(),
                    can_force_activate: !group.is_active && !in_cooldown && healthy == 0,
                    cooldown_remaining,
                    forced_activation_time: group
                        .forced_activation_time
                        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                        .unwrap_or_default(),
                }
            })
            .collect()
    }

    /// 手动暂停组；`duration_seconds == 0` 表示无限期。活跃组会被停用。
    pub fn manual_pause_group(&self, name: &str, duration_seconds: u64) -> Result<()> {
        let mut groups = self.lock();
        let Some(group) = groups.get_mut(name) else {
            return Err(ProxyError::not_found("组", name));
        };

        group.manually_paused = true;
        group.pause_until = if duration_seconds > 0 {
            Some(Utc::now() + Duration::seconds(duration_seconds as i64))
        } else {
            None
        };
        if group.is_active {
            group.is_active = false;
            group.forced_activation = false;
            group.forced_activation_time = None;
        }
        drop(groups);

        tracing::info!(
            "⏸️ [手动暂停] 组 {name} 已暂停 ({})",
            if duration_seconds > 0 {
                format!("{duration_seconds}s")
            } else {
                "无限期".to_string()
            }
        );
        Ok(())
    }

    /// 解除手动暂停
    pub fn manual_resume_group(&self, name: &str) -> Result<()> {
        let mut groups = self.lock();
        let Some(group) = groups.get_mut(name) else {
            return Err(ProxyError::not_found("组", name));
        };
        group.manually_paused = false;
        group.pause_until = None;
        drop(groups);

        tracing::info!("▶️ [恢复] 组 {name} 已解除暂停");
        self.recovery_notify.notify_waiters();
        Ok(())
    }

    /// 手动激活组
    ///
    /// `force = true` 只允许用于没有健康端点的组，成功后依次记录
    /// WARN（强制激活）与 ERROR（安全警告）两条日志。
    pub fn manual_activate_group_with_force(&self, name: &str, force: bool) -> Result<()> {
        let now = Utc::now();
        let (healthy, total, activation_time) = {
            let mut groups = self.lock();
            let Some(group) = groups.get_mut(name) else {
                return Err(ProxyError::not_found("组", name));
            };

            // 冷却惰性过期：到期即清除
            if let Some(until) = group.cooldown_until {
                if until > now {
                    let remaining = until - now;
                    return Err(ProxyError::state(format!(
                        "组 {name} 仍在冷却中, 剩余时间: {}秒",
                        remaining.num_seconds().max(1)
                    )));
                }
                group.cooldown_until = None;
            }

            let healthy = group.healthy_count();
            let total = group.endpoints.len();

            if !force && healthy == 0 {
                return Err(ProxyError::state(format!(
                    "组 {name} 没有健康端点, 无法正常激活, 可尝试强制激活"
                )));
            }
            if force && healthy > 0 {
                return Err(ProxyError::state(format!(
                    "组 {name} 有 {healthy} 个健康端点, 无需强制激活, 请使用正常激活"
                )));
            }

            if !self.allow_multiple_active {
                for other in groups.values_mut() {
                    if other.name != name && other.is_active {
                        other.is_active = false;
                        other.forced_activation = false;
                        other.forced_activation_time = None;
                    }
                }
            }

            let group = groups.get_mut(name).expect("group checked above");
            group.is_active = true;
            group.manually_paused = false;
            group.pause_until = None;
            group.forced_activation = force;
            group.forced_activation_time = force.then_some(now);

            (healthy, total, now)
        };

        if force {
            tracing::warn!(
                "⚠️ [强制激活] 用户强制激活无健康端点组: {name} (健康端点: 0/{total}, 操作时间: {}, 风险等级: HIGH)",
                activation_time.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
            tracing::error!(
                "🚨 [安全警告] 强制激活可能导致请求失败! 组: {name}, 建议尽快检查端点健康状态"
            );
        } else {
            tracing::info!("🔄 [正常激活] 手动激活组: {name} (健康端点: {healthy}/{total})");
        }

        self.recovery_notify.notify_waiters();
        Ok(())
    }

    /// 自动失败转移将组下线并进入冷却
    pub fn enter_cooldown(&self, name: &str) -> Result<()> {
        self.enter_cooldown_for(name, self.cooldown.to_std().unwrap_or_default())
    }

    /// 指定冷却时长的下线（测试与特殊场景用）
    pub fn enter_cooldown_for(&self, name: &str, duration: std::time::Duration) -> Result<()> {
        let mut groups = self.lock();
        let Some(group) = groups.get_mut(name) else {
            return Err(ProxyError::not_found("组", name));
        };
        group.is_active = false;
        group.forced_activation = false;
        group.forced_activation_time = None;
        group.cooldown_until =
            Some(Utc::now() + Duration::from_std(duration).unwrap_or_else(|_| self.cooldown));
        drop(groups);

        tracing::warn!("❄️ [冷却] 组 {name} 已下线进入冷却期");
        Ok(())
    }

    /// 清除冷却状态
    pub fn clear_cooldown(&self, name: &str) -> Result<()> {
        let mut groups = self.lock();
        let Some(group) = groups.get_mut(name) else {
            return Err(ProxyError::not_found("组", name));
        };
        group.cooldown_until = None;
        Ok(())
    }

    /// 端点健康恢复时的广播（由健康检查器调用）
    pub fn notify_endpoint_recovered(&self) {
        self.recovery_notify.notify_waiters();
    }

    /// 自动失败转移：把故障组下线进冷却，并激活下一个可用组
    ///
    /// 只有存在可接替的组时才会执行；没有接替者时故障组保持活跃，
    /// 由挂起/重试路径等待其恢复。返回被激活的组名。
    pub fn failover_to_next_group(&self, failed: &str) -> Option<String> {
        let successor = {
            let mut groups = self.lock();
            if !groups.contains_key(failed) {
                return None;
            }

            let now = Utc::now();
            let successor_name = groups
                .values()
                .filter(|g| {
                    g.name != failed
                        && !g.is_active
                        && !g.pause_in_effect(now)
                        && !g.in_cooldown(now)
                        && g.healthy_count() > 0
                })
                .min_by_key(|g| g.priority)
                .map(|g| g.name.clone())?;

            let cooldown = self.cooldown;
            if let Some(group) = groups.get_mut(failed) {
                group.is_active = false;
                group.forced_activation = false;
                group.forced_activation_time = None;
                group.cooldown_until = Some(now + cooldown);
            }
            if let Some(next) = groups.get_mut(&successor_name) {
                next.is_active = true;
            }
            successor_name
        };

        tracing::warn!("🔀 [自动切换] 组 {failed} 故障进入冷却, 切换到组 {successor}");
        self.recovery_notify.notify_waiters();
        Some(successor)
    }

    fn auto_activate_locked(groups: &mut HashMap<String, Group>) {
        if groups.values().any(|g| g.is_active) {
            return;
        }
        let now = Utc::now();
        let candidate = groups
            .values_mut()
            .filter(|g| {
                !g.pause_in_effect(now) && !g.in_cooldown(now) && g.healthy_count() > 0
            })
            .min_by_key(|g| g.priority);
        if let Some(group) = candidate {
            group.is_active = true;
            tracing::info!(
                "🚀 [自动激活] 组 {} 成为活跃组 (健康端点: {}/{})",
                group.name,
                group.healthy_count(),
                group.endpoints.len()
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Group>> {
        self.groups.lock().expect("group manager lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn snapshot(name: &str, healthy: bool, group_priority: u32) -> EndpointSnapshot {
        EndpointSnapshot {
            name: name.to_string(),
            priority: 1,
            group_priority,
            healthy,
        }
    }

    fn manager() -> GroupManager {
        GroupManager::new(StdDuration::from_secs(60), false)
    }

    #[test]
    fn update_groups_preserves_runtime_state() {
        let gm = manager();
        gm.update_groups(&[snapshot("e1", false, 1), snapshot("e2", true, 2)]);

        gm.manual_activate_group_with_force("e2", false).unwrap();
        gm.manual_pause_group("e1", 0).unwrap();

        // 重建后状态保留
        gm.update_groups(&[snapshot("e1", false, 1), snapshot("e2", true, 2)]);
        let e2 = gm.get_group("e2").unwrap();
        assert!(e2.is_active);
        let e1 = gm.get_group("e1").unwrap();
        assert!(e1.manually_paused);

        // 消失的组状态被丢弃
        gm.update_groups(&[snapshot("e2", true, 2)]);
        assert!(gm.get_group("e1").is_none());
    }

    #[test]
    fn auto_activation_prefers_healthy_high_priority() {
        let gm = manager();
        gm.update_groups(&[snapshot("backup", true, 2), snapshot("main", true, 1)]);

        let active = gm.get_active_groups();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "main");
    }

    #[test]
    fn activation_unknown_group() {
        let gm = manager();
        let err = gm
            .manual_activate_group_with_force("nonexistent-group", true)
            .unwrap_err();
        assert!(err.to_string().contains("组不存在"));

        let err = gm.manual_activate_group_with_force("", true).unwrap_err();
        assert!(err.to_string().contains("组不存在"));
    }

    #[test]
    fn normal_activation_requires_healthy_endpoint() {
        let gm = manager();
        gm.update_groups(&[snapshot("e1", false, 1)]);

        let err = gm.manual_activate_group_with_force("e1", false).unwrap_err();
        assert!(err.to_string().contains("没有健康端点"));
    }

    #[test]
    fn force_activation_refused_with_healthy_endpoints() {
        let gm = manager();
        gm.update_groups(&[snapshot("e1", true, 1)]);
        gm.manual_pause_group("e1", 0).unwrap();

        let err = gm.manual_activate_group_with_force("e1", true).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("有 1 个健康端点"));
        assert!(msg.contains("无需强制激活"));
        assert!(msg.contains("请使用正常激活"));
    }

    #[test]
    fn force_activation_sets_flags() {
        let gm = manager();
        gm.update_groups(&[snapshot("e1", false, 1)]);

        gm.manual_activate_group_with_force("e1", true).unwrap();

        let group = gm.get_group("e1").unwrap();
        assert!(group.is_active);
        assert!(group.forced_activation);
        assert!(group.forced_activation_time.is_some());
    }

    #[test]
    fn cooldown_blocks_until_cleared() {
        let gm = manager();
        gm.update_groups(&[snapshot("endpoint-1", false, 1)]);
        gm.enter_cooldown_for("endpoint-1", StdDuration::from_secs(3600))
            .unwrap();

        let err = gm
            .manual_activate_group_with_force("endpoint-1", true)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("仍在冷却中"));
        assert!(msg.contains("剩余时间"));

        gm.clear_cooldown("endpoint-1").unwrap();
        gm.manual_activate_group_with_force("endpoint-1", true)
            .unwrap();

        let group = gm.get_group("endpoint-1").unwrap();
        assert!(group.is_active);
        assert!(group.forced_activation);
        assert!(group.forced_activation_time.is_some());
    }

    #[test]
    fn expired_cooldown_clears_lazily() {
        let gm = manager();
        gm.update_groups(&[snapshot("e1", false, 1)]);
        gm.enter_cooldown_for("e1", StdDuration::from_millis(1)).unwrap();
        std::thread::sleep(StdDuration::from_millis(20));

        gm.manual_activate_group_with_force("e1", true).unwrap();
        let group = gm.get_group("e1").unwrap();
        assert!(group.cooldown_until.is_none());
        assert!(group.is_active);
    }

    #[test]
    fn single_active_group_invariant() {
        let gm = manager();
        gm.update_groups(&[snapshot("a", true, 1), snapshot("b", true, 2)]);
        assert_eq!(gm.get_active_groups().len(), 1);

        gm.manual_activate_group_with_force("b", false).unwrap();
        let active = gm.get_active_groups();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "b");
    }

    #[test]
    fn pause_deactivates_and_details_reflect() {
        let gm = manager();
        gm.update_groups(&[snapshot("healthy-endpoint", true, 1), snapshot("unhealthy-endpoint", false, 2)]);
        gm.manual_pause_group("healthy-endpoint", 0).unwrap();
        gm.manual_pause_group("unhealthy-endpoint", 0).unwrap();

        for detail in gm.get_group_details() {
            assert!(!detail.is_active);
            match detail.name.as_str() {
                "healthy-endpoint" => {
                    assert!(!detail.can_force_activate);
                    assert!(detail.healthy_endpoints > 0);
                }
                "unhealthy-endpoint" => {
                    assert!(detail.can_force_activate);
                    assert_eq!(detail.healthy_endpoints, 0);
                }
                other => panic!("unexpected group {other}"),
            }
        }
    }

    #[test]
    fn details_after_force_activation() {
        let gm = manager();
        gm.update_groups(&[snapshot("healthy-endpoint", true, 1), snapshot("unhealthy-endpoint", false, 2)]);
        gm.manual_pause_group("healthy-endpoint", 0).unwrap();

        gm.manual_activate_group_with_force("unhealthy-endpoint", true)
            .unwrap();

        let details = gm.get_group_details();
        let unhealthy = details
            .iter()
            .find(|d| d.name == "unhealthy-endpoint")
            .unwrap();
        assert!(unhealthy.is_active);
        assert!(unhealthy.forced_activation);
        assert_eq!(unhealthy.activation_type, "forced");
        assert!(!unhealthy.can_force_activate);
        assert!(!unhealthy.forced_activation_time.is_empty());

        let healthy = details.iter().find(|d| d.name == "healthy-endpoint").unwrap();
        assert!(!healthy.is_active);
        assert!(!healthy.forced_activation);
        assert_eq!(healthy.activation_type, "normal");
    }

    #[test]
    fn cooldown_forces_can_force_activate_false() {
        let gm = manager();
        gm.update_groups(&[snapshot("e1", false, 1)]);
        gm.enter_cooldown_for("e1", StdDuration::from_secs(3600))
            .unwrap();

        let details = gm.get_group_details();
        assert!(!details[0].can_force_activate);
        assert!(details[0].cooldown_remaining > 0);
    }

    #[test]
    fn timed_pause_expires() {
        let gm = manager();
        gm.update_groups(&[snapshot("e1", true, 1)]);
        gm.manual_pause_group("e1", 1).unwrap();

        let group = gm.get_group("e1").unwrap();
        assert!(group.pause_in_effect(Utc::now()));
        assert!(!group.pause_in_effect(Utc::now() + Duration::seconds(5)));
    }
}
