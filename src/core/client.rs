// ============================================================================
// AgentSched - 调度客户端
// ============================================================================
//
// 文件: src/core/client.rs
// 职责: 单个消费者的请求到任务绑定及生命周期回收
// 边界:
//   - ✅ 监控项缓存与导出任务绑定
//   - ✅ 插件使用记录与共享引用计数
//   - ✅ 按插件能力创建/更新任务
//   - ✅ 过期监控项与插件回收
//   - ❌ 不应包含任务执行逻辑
//   - ❌ 不应包含加锁（只由调度管理线程调用）
//
// ============================================================================

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::core::agent::{PluginAgent, PluginRegistry};
use crate::core::interval::next_check;
use crate::error::Result;
use crate::models::plugin::{Capabilities, PluginOptions};
use crate::models::request::{Request, SinkRef};
use crate::models::task::{Task, TaskKind, TaskRef};

/// 直接请求客户端的插件保留时间（一天加一小时，保证每日检查不被回收）
pub const DIRECT_CLIENT_RETENTION_HOURS: i64 = 25;

/// 监控项在客户端中的当前状态，导出任务共享持有
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientItem {
    pub itemid: u64,
    pub delay: String,
    pub unsupported: bool,
    pub key: String,
    pub updated: DateTime<Utc>,
}

/// 监控项共享引用
pub type ItemRef = Arc<Mutex<ClientItem>>;

impl ClientItem {
    pub fn new(
        itemid: u64,
        key: impl Into<String>,
        delay: impl Into<String>,
        updated: DateTime<Utc>,
    ) -> Self {
        Self { itemid, delay: delay.into(), unsupported: false, key: key.into(), updated }
    }

    pub fn into_ref(self) -> ItemRef {
        Arc::new(Mutex::new(self))
    }
}

/// 缓存条目：监控项及其唯一的导出任务
#[derive(Debug)]
struct CachedItem {
    item: ItemRef,
    task: TaskRef,
}

/// 客户端对单个插件的使用记录
#[derive(Debug, Default)]
pub struct PluginUsage {
    /// 最后使用时间，None 表示从未使用
    used: Option<DateTime<Utc>>,
    /// 本客户端的 Watcher 任务
    watcher: Option<TaskRef>,
}

impl PluginUsage {
    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.used
    }

    pub fn watcher(&self) -> Option<&TaskRef> {
        self.watcher.as_ref()
    }
}

/// 调度客户端
///
/// ID 0 为直接请求客户端：插件保留 25 小时，不支持 Watcher。
#[derive(Debug)]
pub struct Client {
    id: u64,
    items: HashMap<u64, CachedItem>,
    plugins: HashMap<String, PluginUsage>,
}

impl Client {
    /// 创建新客户端
    pub fn new(id: u64) -> Self {
        Self { id, items: HashMap::new(), plugins: HashMap::new() }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// 缓存的监控项
    pub fn item(&self, itemid: u64) -> Option<ItemRef> {
        self.items.get(&itemid).map(|cached| Arc::clone(&cached.item))
    }

    /// 缓存监控项绑定的导出任务
    pub fn item_task(&self, itemid: u64) -> Option<TaskRef> {
        self.items.get(&itemid).map(|cached| Arc::clone(&cached.task))
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn usage(&self, plugin: &str) -> Option<&PluginUsage> {
        self.plugins.get(plugin)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// 将请求绑定到插件能力所需的任务上
    ///
    /// 只有非零监控项的检查间隔无效时返回错误；此前已完成的能力处理不会回滚。
    pub fn bind_request(
        &mut self,
        agent: &mut PluginAgent,
        request: &Request,
        sink: &SinkRef,
        options: &PluginOptions,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let usage = self.plugins.entry(agent.name().to_string()).or_default();

        // 插件级首次使用判断，各能力共用，避免重复激活
        let first_use = agent.refcount() == 0 && usage.used.is_none();
        if usage.used.is_none() {
            agent.acquire();
        }
        usage.used = Some(now);

        if agent.has(Capabilities::COLLECTOR) && first_use {
            let task = Task::new(
                agent.plugin(),
                TaskKind::Collector { seed: u64::from(fnv1a32(agent.name().as_bytes())) },
            )
            .into_ref();
            task.lock().reschedule(now)?;
            agent.enqueue_task(task);
            debug!(
                "[{}] created collector task for plugin {} with collecting interval {}",
                self.id,
                agent.name(),
                agent.period()
            );
        }

        if agent.has(Capabilities::EXPORTER) {
            self.bind_exporter(agent, request, sink, now)?;
        }

        if agent.has(Capabilities::RUNNER) && first_use {
            let task = Task::new(agent.plugin(), TaskKind::Starter).into_ref();
            task.lock().reschedule(now)?;
            agent.enqueue_task(task);
            debug!("[{}] created starter task for plugin {}", self.id, agent.name());
        }

        // 直接请求不支持 Watcher
        if self.id != 0 && agent.has(Capabilities::WATCHER) {
            self.bind_watcher(agent, request, sink, now)?;
        }

        if agent.has(Capabilities::CONFIGURATOR) && first_use {
            if let Some(options) = options.get(agent.name()) {
                let task = Task::new(
                    agent.plugin(),
                    TaskKind::Configurator { options: options.clone() },
                )
                .into_ref();
                task.lock().reschedule(now)?;
                agent.enqueue_task(task);
                debug!("[{}] created configurator task for plugin {}", self.id, agent.name());
            }
        }

        Ok(())
    }

    fn bind_exporter(
        &mut self,
        agent: &PluginAgent,
        request: &Request,
        sink: &SinkRef,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if request.itemid != 0 {
            next_check(request.itemid, &request.delay, false, now)?;
        }

        match self.items.get(&request.itemid) {
            None => {
                let item =
                    ClientItem::new(request.itemid, request.key.as_str(), request.delay.as_str(), now)
                        .into_ref();
                let task = Task::new(
                    agent.plugin(),
                    TaskKind::Exporter { writer: Arc::clone(sink), item: Arc::clone(&item) },
                )
                .into_ref();

                // 只缓存计划请求，直接请求立即执行
                if request.itemid != 0 {
                    task.lock().reschedule(now)?;
                    self.items
                        .insert(request.itemid, CachedItem { item, task: Arc::clone(&task) });
                }
                agent.enqueue_task(task);
                debug!("[{}] created exporter task for plugin {}", self.id, agent.name());
            }
            Some(cached) => {
                let reschedule = {
                    let mut item = cached.item.lock();
                    item.updated = now;
                    let changed = item.delay != request.delay && !item.unsupported;
                    item.delay = request.delay.clone();
                    item.key = request.key.clone();
                    changed
                };
                if reschedule {
                    cached.task.lock().reschedule(now)?;
                    agent.update_task(&cached.task);
                    debug!("[{}] updated exporter task for plugin {}", self.id, agent.name());
                }
            }
        }

        Ok(())
    }

    fn bind_watcher(
        &mut self,
        agent: &mut PluginAgent,
        request: &Request,
        sink: &SinkRef,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let usage = self.plugins.entry(agent.name().to_string()).or_default();

        let watcher = match &usage.watcher {
            Some(task) => Arc::clone(task),
            None => {
                let task = Task::new(
                    agent.plugin(),
                    TaskKind::Watcher { sink: Arc::clone(sink), requests: Vec::with_capacity(1) },
                )
                .into_ref();
                task.lock().reschedule(now)?;
                agent.enqueue_task(Arc::clone(&task));
                usage.watcher = Some(Arc::clone(&task));
                debug!("[{}] created watcher task for plugin {}", self.id, agent.name());
                task
            }
        };

        watcher.lock().push_request(request.clone());
        agent.set_watcher(watcher);
        Ok(())
    }

    /// 回收过期监控项和不再使用的插件，返回本次释放的插件名称
    pub fn reclaim(&mut self, registry: &mut PluginRegistry, now: DateTime<Utc>) -> Vec<String> {
        let mut released = Vec::with_capacity(self.plugins.len());

        // 清除本周期的临时 Watcher 引用
        for name in self.plugins.keys() {
            if let Some(agent) = registry.get_mut(name) {
                agent.take_watcher();
            }
        }

        self.items.retain(|_, cached| {
            let stale = cached.item.lock().updated < now;
            if stale {
                cached.task.lock().deactivate();
            }
            !stale
        });

        let expiry = if self.id != 0 {
            now
        } else {
            now - Duration::hours(DIRECT_CLIENT_RETENTION_HOURS)
        };

        for agent in registry.iter_mut() {
            let expired = match self.plugins.get(agent.name()) {
                Some(usage) => usage.used.map_or(true, |used| used < expiry),
                None => false,
            };
            if !expired {
                continue;
            }

            if let Some(usage) = self.plugins.remove(agent.name()) {
                if let Some(watcher) = usage.watcher {
                    watcher.lock().deactivate();
                }
                agent.release();
                released.push(agent.name().to_string());

                if self.id != 0 {
                    debug!("[{}] released unused plugin {}", self.id, agent.name());
                } else {
                    let since = usage
                        .used
                        .map(|used| used.format("%b %e %H:%M:%S").to_string())
                        .unwrap_or_default();
                    debug!("[{}] released plugin {} as not used since {}", self.id, agent.name(), since);
                }
            }
        }

        released
    }
}

/// 32 位 FNV-1a 哈希，用于生成稳定的采集任务种子
pub fn fnv1a32(data: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    data.iter()
        .fold(OFFSET_BASIS, |hash, byte| (hash ^ u32::from(*byte)).wrapping_mul(PRIME))
}
