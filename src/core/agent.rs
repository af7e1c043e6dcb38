// ============================================================================
// AgentSched - 插件代理与注册表
// ============================================================================
//
// 文件: src/core/agent.rs
// 职责: 插件实现的注册表条目（引用计数、任务队列、临时 Watcher 槽位）
// 边界:
//   - ✅ 插件代理数据结构
//   - ✅ 跨客户端共享的引用计数
//   - ✅ 指标名到插件的路由
//   - ❌ 不应包含请求绑定逻辑
//   - ❌ 不应包含任务执行逻辑
//
// ============================================================================

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::core::queue::TaskQueue;
use crate::error::{Result, SchedulerError};
use crate::models::plugin::{Capabilities, Plugin};
use crate::models::request::parse_key;
use crate::models::task::TaskRef;

/// 插件代理
///
/// 只由调度管理线程修改，引用计数与 Watcher 槽位无需加锁。
pub struct PluginAgent {
    plugin: Arc<dyn Plugin>,
    capabilities: Capabilities,
    refcount: u32,
    /// 本周期的 Watcher 任务，由 reclaim 清空
    watcher: Option<TaskRef>,
    tasks: Arc<TaskQueue>,
}

impl PluginAgent {
    pub fn new(plugin: Arc<dyn Plugin>) -> Self {
        let capabilities = plugin.capabilities();
        Self { plugin, capabilities, refcount: 0, watcher: None, tasks: TaskQueue::new() }
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn has(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }

    /// 采集周期（秒）
    pub fn period(&self) -> u64 {
        self.plugin.period()
    }

    pub fn plugin(&self) -> Arc<dyn Plugin> {
        Arc::clone(&self.plugin)
    }

    pub fn queue(&self) -> Arc<TaskQueue> {
        Arc::clone(&self.tasks)
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    pub(crate) fn acquire(&mut self) {
        self.refcount += 1;
    }

    /// 释放一次引用，返回剩余引用数
    pub(crate) fn release(&mut self) -> u32 {
        self.refcount = self.refcount.saturating_sub(1);
        self.refcount
    }

    pub fn enqueue_task(&self, task: TaskRef) {
        self.tasks.enqueue(task);
    }

    /// 通知队列任务计划时间已变化
    pub fn update_task(&self, task: &TaskRef) {
        self.tasks.update(task);
    }

    pub fn watcher(&self) -> Option<&TaskRef> {
        self.watcher.as_ref()
    }

    pub(crate) fn set_watcher(&mut self, task: TaskRef) {
        self.watcher = Some(task);
    }

    pub(crate) fn take_watcher(&mut self) -> Option<TaskRef> {
        self.watcher.take()
    }
}

/// 插件注册表
#[derive(Default)]
pub struct PluginRegistry {
    agents: BTreeMap<String, PluginAgent>,
    metrics: HashMap<String, String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册插件及其提供的指标
    pub fn register(&mut self, plugin: Arc<dyn Plugin>, metrics: &[&str]) -> Result<()> {
        let name = plugin.name().to_string();
        if self.agents.contains_key(&name) {
            return Err(SchedulerError::plugin_failure(&name, "plugin is already registered"));
        }
        if let Some(metric) = metrics.iter().find(|metric| self.metrics.contains_key(**metric)) {
            let owner = &self.metrics[*metric];
            return Err(SchedulerError::plugin_failure(
                &name,
                format!("metric {} is already provided by plugin {}", metric, owner),
            ));
        }

        for metric in metrics {
            self.metrics.insert(metric.to_string(), name.clone());
        }
        debug!(
            "registered plugin {} ({}) with {} metrics",
            name,
            plugin.capabilities(),
            metrics.len()
        );
        self.agents.insert(name, PluginAgent::new(plugin));
        Ok(())
    }

    /// 根据监控项键查找插件名称
    pub fn plugin_for_key(&self, key: &str) -> Result<&str> {
        let (metric, _) = parse_key(key)?;
        self.metrics
            .get(&metric)
            .map(String::as_str)
            .ok_or_else(|| SchedulerError::UnknownMetric { key: key.to_string() })
    }

    pub fn get(&self, name: &str) -> Option<&PluginAgent> {
        self.agents.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PluginAgent> {
        self.agents.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginAgent> {
        self.agents.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PluginAgent> {
        self.agents.values_mut()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPlugin;

    #[test]
    fn routes_keys_to_plugins() {
        let mut registry = PluginRegistry::new();
        assert!(registry.is_empty());
        registry
            .register(RecordingPlugin::new("Agent", Capabilities::EXPORTER), &["agent.ping"])
            .unwrap();
        assert!(!registry.is_empty());

        assert_eq!(registry.plugin_for_key("agent.ping").unwrap(), "Agent");
        assert_eq!(registry.plugin_for_key("agent.ping[]").unwrap(), "Agent");
        assert!(matches!(
            registry.plugin_for_key("agent.pong"),
            Err(SchedulerError::UnknownMetric { .. })
        ));
        assert!(matches!(
            registry.plugin_for_key("agent.ping[x"),
            Err(SchedulerError::InvalidKey { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_registrations() {
        let mut registry = PluginRegistry::new();
        registry
            .register(RecordingPlugin::new("Agent", Capabilities::EXPORTER), &["agent.ping"])
            .unwrap();

        let duplicate_name =
            registry.register(RecordingPlugin::new("Agent", Capabilities::EXPORTER), &["other"]);
        assert!(duplicate_name.is_err());

        let duplicate_metric =
            registry.register(RecordingPlugin::new("Other", Capabilities::EXPORTER), &["agent.ping"]);
        assert!(duplicate_metric.is_err());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.plugin_for_key("other").ok(), None);
    }

    #[test]
    fn refcount_never_goes_negative() {
        let mut agent = PluginAgent::new(RecordingPlugin::new("Agent", Capabilities::EXPORTER));
        agent.acquire();
        assert_eq!(agent.release(), 0);
        assert_eq!(agent.release(), 0);
    }
}
