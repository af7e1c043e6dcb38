// ============================================================================
// AgentSched - 任务数据模型
// ============================================================================
//
// 文件: src/models/task.rs
// 职责: 插件任务的数据结构、调度时间计算和执行单元定义
// 边界:
//   - ✅ 任务种类和负载定义
//   - ✅ 任务激活状态与重新调度
//   - ✅ 任务执行单元（Job）提取与执行
//   - ❌ 不应包含任务排队逻辑
//   - ❌ 不应包含请求绑定逻辑
//   - ❌ 不应包含 CLI 相关逻辑
//
// ============================================================================

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::client::ItemRef;
use crate::core::interval::{self, next_check};
use crate::error::{Result, SchedulerError};
use crate::models::plugin::Plugin;
use crate::models::request::{parse_key, AgentResult, Request, SinkRef};

/// 任务共享引用（调度线程与工作线程共同持有）
pub type TaskRef = Arc<Mutex<Task>>;

/// 批量推送任务的重新激活间隔
const WATCHER_REARM_SECONDS: i64 = 1;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// 任务种类及其负载
pub enum TaskKind {
    /// 周期性采集，种子用于错开首次执行
    Collector { seed: u64 },
    /// 监控项数值导出
    Exporter { writer: SinkRef, item: ItemRef },
    /// 一次性启动
    Starter,
    /// 一次性停止
    Stopper,
    /// 批量推送，累积本周期的请求
    Watcher { sink: SinkRef, requests: Vec<Request> },
    /// 一次性配置
    Configurator { options: toml::Value },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Collector { .. } => "collector",
            TaskKind::Exporter { .. } => "exporter",
            TaskKind::Starter => "starter",
            TaskKind::Stopper => "stopper",
            TaskKind::Watcher { .. } => "watcher",
            TaskKind::Configurator { .. } => "configurator",
        }
    }
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Collector { seed } => f.debug_struct("Collector").field("seed", seed).finish(),
            TaskKind::Exporter { item, .. } => {
                f.debug_struct("Exporter").field("itemid", &item.lock().itemid).finish()
            }
            TaskKind::Watcher { requests, .. } => {
                f.debug_struct("Watcher").field("requests", &requests.len()).finish()
            }
            TaskKind::Configurator { options } => {
                f.debug_struct("Configurator").field("options", options).finish()
            }
            other => write!(f, "{}", other.name()),
        }
    }
}

/// 插件任务
pub struct Task {
    id: u64,
    plugin: Arc<dyn Plugin>,
    kind: TaskKind,
    active: bool,
    /// 计划执行时间，None 表示立即执行
    scheduled: Option<DateTime<Utc>>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("plugin", &self.plugin.name())
            .field("kind", &self.kind)
            .field("active", &self.active)
            .field("scheduled", &self.scheduled)
            .finish()
    }
}

impl Task {
    /// 创建新任务（默认激活）
    pub fn new(plugin: Arc<dyn Plugin>, kind: TaskKind) -> Self {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            plugin,
            kind,
            active: true,
            scheduled: None,
        }
    }

    pub fn into_ref(self) -> TaskRef {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn plugin_name(&self) -> &str {
        self.plugin.name()
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn scheduled(&self) -> Option<DateTime<Utc>> {
        self.scheduled
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 停用任务，仅设置标志，不等待执行中的任务结束
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// 立即执行（用于周期结束时推送批量请求）
    pub fn schedule_at(&mut self, at: DateTime<Utc>) {
        self.scheduled = Some(at);
    }

    /// 执行后是否需要重新排队
    pub fn is_periodic(&self) -> bool {
        match &self.kind {
            TaskKind::Collector { .. } | TaskKind::Watcher { .. } => true,
            TaskKind::Exporter { item, .. } => item.lock().itemid != 0,
            _ => false,
        }
    }

    /// 追加批量推送请求，非 Watcher 任务返回 false
    pub fn push_request(&mut self, request: Request) -> bool {
        match &mut self.kind {
            TaskKind::Watcher { requests, .. } => {
                requests.push(request);
                true
            }
            _ => false,
        }
    }

    /// 已累积但尚未推送的请求
    pub fn pending_requests(&self) -> &[Request] {
        match &self.kind {
            TaskKind::Watcher { requests, .. } => requests.as_slice(),
            _ => &[],
        }
    }

    /// 根据任务种类计算下次执行时间
    pub fn reschedule(&mut self, now: DateTime<Utc>) -> Result<()> {
        let scheduled = match &self.kind {
            TaskKind::Collector { seed } => {
                let period = self.plugin.period().max(1) as i64;
                interval::align(*seed, period, now).ok_or_else(|| {
                    SchedulerError::plugin_failure(self.plugin.name(), "collector period out of range")
                })?
            }
            TaskKind::Exporter { item, .. } => {
                let item = item.lock();
                next_check(item.itemid, &item.delay, item.unsupported, now)?
            }
            TaskKind::Watcher { .. } => now + Duration::seconds(WATCHER_REARM_SECONDS),
            TaskKind::Starter | TaskKind::Stopper | TaskKind::Configurator { .. } => now,
        };
        self.scheduled = Some(scheduled);
        Ok(())
    }

    /// 提取执行单元，持锁时间仅限于复制负载
    pub fn take_job(&mut self) -> Job {
        let plugin = Arc::clone(&self.plugin);
        match &mut self.kind {
            TaskKind::Collector { .. } => Job::Collect { plugin },
            TaskKind::Exporter { writer, item } => {
                Job::Export { plugin, writer: Arc::clone(writer), item: Arc::clone(item) }
            }
            TaskKind::Starter => Job::Start { plugin },
            TaskKind::Stopper => Job::Stop { plugin },
            TaskKind::Watcher { sink, requests } => Job::Watch {
                plugin,
                sink: Arc::clone(sink),
                requests: std::mem::take(requests),
            },
            TaskKind::Configurator { options } => Job::Configure { plugin, options: options.clone() },
        }
    }
}

/// 脱离任务锁执行的工作单元
pub enum Job {
    Collect { plugin: Arc<dyn Plugin> },
    Export { plugin: Arc<dyn Plugin>, writer: SinkRef, item: ItemRef },
    Start { plugin: Arc<dyn Plugin> },
    Stop { plugin: Arc<dyn Plugin> },
    Watch { plugin: Arc<dyn Plugin>, sink: SinkRef, requests: Vec<Request> },
    Configure { plugin: Arc<dyn Plugin>, options: toml::Value },
}

impl Job {
    /// 在工作线程上执行
    pub fn run(self, now: DateTime<Utc>) {
        match self {
            Job::Collect { plugin } => {
                if let Err(e) = plugin.collect() {
                    warn!("plugin {} collection failed: {:#}", plugin.name(), e);
                }
            }
            Job::Export { plugin, writer, item } => export_item(plugin.as_ref(), &writer, &item, now),
            Job::Start { plugin } => {
                debug!("starting plugin {}", plugin.name());
                plugin.start();
            }
            Job::Stop { plugin } => {
                debug!("stopping plugin {}", plugin.name());
                plugin.stop();
            }
            Job::Watch { plugin, sink, requests } => {
                // 空批次不推送
                if !requests.is_empty() {
                    plugin.watch(&requests, &sink);
                }
            }
            Job::Configure { plugin, options } => {
                if let Err(e) = plugin.configure(&options) {
                    warn!("plugin {} configuration failed: {:#}", plugin.name(), e);
                }
            }
        }
    }
}

fn export_item(plugin: &dyn Plugin, writer: &SinkRef, item: &ItemRef, now: DateTime<Utc>) {
    let request = {
        let item = item.lock();
        Request::new(item.itemid, item.key.clone(), item.delay.clone())
    };

    let outcome = parse_key(&request.key)
        .map_err(anyhow::Error::from)
        .and_then(|(name, params)| plugin.export(&name, &params));

    let result = match outcome {
        Ok(value) => {
            item.lock().unsupported = false;
            AgentResult::value(&request, value, now)
        }
        Err(e) => {
            debug!("item {} ({}) is not supported: {:#}", request.itemid, request.key, e);
            item.lock().unsupported = true;
            AgentResult::error(&request, format!("{:#}", e), now)
        }
    };
    writer.write(result);
}
