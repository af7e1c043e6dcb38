// ============================================================================
// AgentSched - 调度管理器
// ============================================================================
//
// 文件: src/core/scheduler.rs
// 职责: 客户端与插件注册表的单线程所有者，以及任务分发执行
// 边界:
//   - ✅ 更新请求和直接请求处理
//   - ✅ 周期回收与插件释放处理
//   - ✅ 单线程管理 actor（命令通道）
//   - ✅ 并发数量控制的任务分发
//   - ❌ 不包含请求绑定细节
//   - ❌ 不包含插件实现
//   - ❌ 不包含配置文件读取
//
// ============================================================================

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::agent::PluginRegistry;
use crate::core::client::Client;
use crate::core::queue::TaskQueue;
use crate::error::{Result, SchedulerError};
use crate::models::plugin::{Capabilities, PluginOptions};
use crate::models::request::{AgentResult, Request, SinkRef};
use crate::models::task::{Task, TaskKind, TaskRef};

/// 直接请求客户端ID
pub const DIRECT_CLIENT_ID: u64 = 0;

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 最大并发任务数
    pub max_concurrency: usize,
    /// 分发轮询间隔
    pub tick: Duration,
    /// 直接请求客户端的回收间隔
    pub direct_reclaim_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get(),
            tick: Duration::from_millis(100),
            direct_reclaim_interval: Duration::from_secs(60),
        }
    }
}

/// 一次更新请求的处理结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// 成功绑定的请求数
    pub bound: usize,
    /// 失败的请求数（已向结果输出写入错误）
    pub failed: usize,
    /// 本周期释放的插件
    pub released: Vec<String>,
}

/// 插件状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginStatus {
    pub name: String,
    pub capabilities: Capabilities,
    pub refcount: u32,
    pub queued: usize,
}

/// 调度管理器，持有全部客户端和插件注册表
pub struct SchedulerManager {
    registry: PluginRegistry,
    clients: HashMap<u64, Client>,
    options: Arc<PluginOptions>,
}

impl SchedulerManager {
    pub fn new(registry: PluginRegistry, options: Arc<PluginOptions>) -> Self {
        Self { registry, clients: HashMap::new(), options }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn client(&self, id: u64) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// 处理一个客户端的周期更新：绑定请求、推送批量请求、回收
    pub fn process_update(
        &mut self,
        client_id: u64,
        requests: &[Request],
        sink: &SinkRef,
        now: DateTime<Utc>,
    ) -> UpdateSummary {
        let client = self.clients.entry(client_id).or_insert_with(|| Client::new(client_id));
        let mut summary = UpdateSummary::default();

        for request in requests {
            let bound = match self.registry.plugin_for_key(&request.key) {
                Ok(name) => {
                    let name = name.to_string();
                    match self.registry.get_mut(&name) {
                        Some(agent) => {
                            client.bind_request(agent, request, sink, &self.options, now)
                        }
                        None => Err(SchedulerError::UnknownMetric { key: request.key.clone() }),
                    }
                }
                Err(e) => Err(e),
            };

            match bound {
                Ok(()) => summary.bound += 1,
                Err(e) => {
                    warn!("[{}] cannot bind item {} ({}): {}", client_id, request.itemid, request.key, e);
                    sink.write(AgentResult::error(request, &e, now));
                    summary.failed += 1;
                }
            }
        }

        Self::flush_watchers(&self.registry, now);
        summary.released = client.reclaim(&mut self.registry, now);
        self.handle_released(&summary.released, now);

        debug!(
            "[{}] processed {} requests, {} failed, {} plugins released",
            client_id,
            requests.len(),
            summary.failed,
            summary.released.len()
        );
        summary
    }

    /// 通过直接请求客户端绑定单个请求，不做回收
    pub fn process_direct(
        &mut self,
        request: &Request,
        sink: &SinkRef,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let client = self
            .clients
            .entry(DIRECT_CLIENT_ID)
            .or_insert_with(|| Client::new(DIRECT_CLIENT_ID));
        let name = self.registry.plugin_for_key(&request.key)?.to_string();
        let agent = self
            .registry
            .get_mut(&name)
            .ok_or_else(|| SchedulerError::UnknownMetric { key: request.key.clone() })?;
        client.bind_request(agent, request, sink, &self.options, now)
    }

    /// 按需回收直接请求客户端
    pub fn reclaim_direct(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let released = match self.clients.get_mut(&DIRECT_CLIENT_ID) {
            Some(client) => client.reclaim(&mut self.registry, now),
            None => Vec::new(),
        };
        self.handle_released(&released, now);
        released
    }

    /// 插件状态快照
    pub fn status(&self) -> Vec<PluginStatus> {
        self.registry
            .iter()
            .map(|agent| PluginStatus {
                name: agent.name().to_string(),
                capabilities: agent.capabilities(),
                refcount: agent.refcount(),
                queued: agent.queue().len(),
            })
            .collect()
    }

    /// 本周期累积的批量请求立即推送
    fn flush_watchers(registry: &PluginRegistry, now: DateTime<Utc>) {
        for agent in registry.iter() {
            if let Some(watcher) = agent.watcher() {
                watcher.lock().schedule_at(now);
                agent.update_task(watcher);
            }
        }
    }

    /// 不再被任何客户端使用的 Runner 插件安排停止任务
    fn handle_released(&mut self, released: &[String], now: DateTime<Utc>) {
        for name in released {
            let Some(agent) = self.registry.get_mut(name) else {
                continue;
            };
            if agent.refcount() != 0 {
                continue;
            }
            info!("plugin {} is no longer used", name);
            if agent.has(Capabilities::RUNNER) {
                let mut task = Task::new(agent.plugin(), TaskKind::Stopper);
                if let Err(e) = task.reschedule(now) {
                    warn!("cannot schedule stopper task for plugin {}: {}", name, e);
                    continue;
                }
                agent.enqueue_task(task.into_ref());
                debug!("created stopper task for plugin {}", name);
            }
        }
    }
}

/// 管理 actor 命令
enum Command {
    Update {
        client_id: u64,
        requests: Vec<Request>,
        sink: SinkRef,
        reply: oneshot::Sender<UpdateSummary>,
    },
    Direct {
        request: Request,
        sink: SinkRef,
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        reply: oneshot::Sender<Vec<PluginStatus>>,
    },
}

/// 分发统计
#[derive(Debug, Default)]
pub struct DispatchStats {
    executed: AtomicUsize,
    rearmed: AtomicUsize,
}

impl DispatchStats {
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn rearmed(&self) -> usize {
        self.rearmed.load(Ordering::Relaxed)
    }
}

/// 运行中调度器的句柄
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    stats: Arc<DispatchStats>,
    workers: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// 提交一个客户端的周期更新
    pub async fn update(
        &self,
        client_id: u64,
        requests: Vec<Request>,
        sink: SinkRef,
    ) -> Result<UpdateSummary> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Update { client_id, requests, sink, reply })
            .map_err(|_| SchedulerError::ManagerStopped)?;
        rx.await.map_err(|_| SchedulerError::ManagerStopped)
    }

    /// 提交直接请求
    pub async fn direct(&self, request: Request, sink: SinkRef) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Direct { request, sink, reply })
            .map_err(|_| SchedulerError::ManagerStopped)?;
        rx.await.map_err(|_| SchedulerError::ManagerStopped)?
    }

    pub async fn status(&self) -> Result<Vec<PluginStatus>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Status { reply }).map_err(|_| SchedulerError::ManagerStopped)?;
        rx.await.map_err(|_| SchedulerError::ManagerStopped)
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// 停止管理 actor 和分发器，等待其退出
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("scheduler worker join error: {}", e);
            }
        }
    }
}

/// 启动管理 actor 与任务分发器
pub fn spawn(manager: SchedulerManager, config: SchedulerConfig) -> SchedulerHandle {
    if manager.registry().is_empty() {
        warn!("no plugins registered, every request will fail");
    }
    let queues: Vec<Arc<TaskQueue>> = manager.registry().iter().map(|agent| agent.queue()).collect();
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let stats = Arc::new(DispatchStats::default());

    let actor = tokio::spawn(run_manager(manager, rx, config.clone(), cancel.clone()));
    let dispatcher = tokio::spawn(run_dispatcher(queues, config, cancel.clone(), Arc::clone(&stats)));

    SchedulerHandle { tx, cancel, stats, workers: vec![actor, dispatcher] }
}

async fn run_manager(
    mut manager: SchedulerManager,
    mut rx: mpsc::UnboundedReceiver<Command>,
    config: SchedulerConfig,
    cancel: CancellationToken,
) {
    let mut reclaim = tokio::time::interval(config.direct_reclaim_interval);
    reclaim.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = rx.recv() => {
                let Some(command) = command else { break };
                match command {
                    Command::Update { client_id, requests, sink, reply } => {
                        let summary = manager.process_update(client_id, &requests, &sink, Utc::now());
                        let _ = reply.send(summary);
                    }
                    Command::Direct { request, sink, reply } => {
                        let _ = reply.send(manager.process_direct(&request, &sink, Utc::now()));
                    }
                    Command::Status { reply } => {
                        let _ = reply.send(manager.status());
                    }
                }
            }
            _ = reclaim.tick() => {
                manager.reclaim_direct(Utc::now());
            }
        }
    }
    debug!("scheduler manager stopped");
}

async fn run_dispatcher(
    queues: Vec<Arc<TaskQueue>>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    stats: Arc<DispatchStats>,
) {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut tick = tokio::time::interval(config.tick);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        let now = Utc::now();
        for queue in &queues {
            while let Some(task) = queue.pop_due(now) {
                let permit = tokio::select! {
                    _ = cancel.cancelled() => return,
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                let queue = Arc::clone(queue);
                let stats = Arc::clone(&stats);
                tokio::task::spawn_blocking(move || {
                    perform(&task, &queue, &stats);
                    drop(permit);
                });
            }
        }
    }
    debug!("task dispatcher stopped");
}

/// 在工作线程上执行任务，周期性任务执行后重新排队
fn perform(task: &TaskRef, queue: &TaskQueue, stats: &DispatchStats) {
    let job = task.lock().take_job();
    job.run(Utc::now());
    stats.executed.fetch_add(1, Ordering::Relaxed);

    let rearm = {
        let mut task = task.lock();
        if !task.is_active() || !task.is_periodic() {
            false
        } else if let Err(e) = task.reschedule(Utc::now()) {
            warn!("cannot reschedule {} task of plugin {}: {}", task.kind().name(), task.plugin_name(), e);
            false
        } else {
            true
        }
    };
    if rearm {
        queue.enqueue(Arc::clone(task));
        stats.rearmed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::ChannelWriter;
    use crate::testing::{MemorySink, RecordingPlugin};

    fn at(ts: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(ts, 0).unwrap()
    }

    fn manager_with(plugin: Arc<RecordingPlugin>, metric: &str) -> SchedulerManager {
        let mut registry = PluginRegistry::new();
        registry.register(plugin, &[metric]).unwrap();
        SchedulerManager::new(registry, Arc::new(PluginOptions::default()))
    }

    #[test]
    fn update_reports_failures_to_sink_and_continues() {
        let plugin = RecordingPlugin::new("Agent", Capabilities::EXPORTER);
        let mut manager = manager_with(plugin, "agent.ping");
        let sink = MemorySink::new();
        let sink_ref: SinkRef = sink.clone();

        let requests = vec![
            Request::new(1, "agent.ping", "10s"),
            Request::new(2, "unknown.metric", "10s"),
            Request::new(3, "agent.ping", "never"),
        ];
        let summary = manager.process_update(1, &requests, &sink_ref, at(100));

        assert_eq!(summary.bound, 1);
        assert_eq!(summary.failed, 2);
        assert!(summary.released.is_empty());
        let errors: Vec<u64> = sink.results().iter().map(|r| r.itemid).collect();
        assert_eq!(errors, vec![2, 3]);
        assert_eq!(manager.client(1).unwrap().item_count(), 1);
    }

    #[test]
    fn released_runner_gets_stopper_task() {
        let plugin = RecordingPlugin::new("Svc", Capabilities::EXPORTER | Capabilities::RUNNER);
        let mut manager = manager_with(plugin, "svc.state");
        let sink: SinkRef = MemorySink::new();

        manager.process_update(1, &[Request::new(1, "svc.state", "10s")], &sink, at(100));
        let summary = manager.process_update(1, &[], &sink, at(110));
        assert_eq!(summary.released, vec!["Svc".to_string()]);

        let kinds: Vec<&str> = manager
            .registry()
            .get("Svc")
            .unwrap()
            .queue()
            .tasks()
            .iter()
            .map(|task| task.lock().kind().name())
            .collect();
        assert!(kinds.contains(&"stopper"));
        assert_eq!(manager.status()[0].refcount, 0);
    }

    #[test]
    fn still_used_plugin_is_not_stopped() {
        let plugin = RecordingPlugin::new("Svc", Capabilities::EXPORTER | Capabilities::RUNNER);
        let mut manager = manager_with(plugin, "svc.state");
        let sink: SinkRef = MemorySink::new();

        manager.process_update(1, &[Request::new(1, "svc.state", "10s")], &sink, at(100));
        manager.process_update(2, &[Request::new(2, "svc.state", "10s")], &sink, at(100));
        let summary = manager.process_update(1, &[], &sink, at(110));
        assert_eq!(summary.released, vec!["Svc".to_string()]);

        let status = manager.status();
        assert_eq!(status[0].refcount, 1);
        let tasks = manager.registry().get("Svc").unwrap().queue().tasks();
        assert!(tasks.iter().all(|task| task.lock().kind().name() != "stopper"));
    }

    #[test]
    fn watcher_batch_is_flushed_at_cycle_end() {
        let plugin = RecordingPlugin::new("Trap", Capabilities::WATCHER);
        let mut manager = manager_with(plugin, "trap");
        let sink: SinkRef = MemorySink::new();

        let requests = vec![Request::new(1, "trap[a]", "10s"), Request::new(2, "trap[b]", "10s")];
        manager.process_update(3, &requests, &sink, at(100));

        let usage = manager.client(3).unwrap().usage("Trap").unwrap();
        let watcher = usage.watcher().unwrap().lock();
        assert_eq!(watcher.scheduled(), Some(at(100)));
        assert_eq!(watcher.pending_requests().len(), 2);
        // reclaim 已清空临时槽位
        assert!(manager.registry().get("Trap").unwrap().watcher().is_none());
    }

    #[test]
    fn direct_requests_use_client_zero() {
        let plugin = RecordingPlugin::new("Agent", Capabilities::EXPORTER);
        let mut manager = manager_with(plugin, "agent.ping");
        let sink: SinkRef = MemorySink::new();

        manager.process_direct(&Request::direct("agent.ping"), &sink, at(100)).unwrap();
        assert!(matches!(
            manager.process_direct(&Request::direct("agent.pong"), &sink, at(100)),
            Err(SchedulerError::UnknownMetric { .. })
        ));
        assert_eq!(manager.client(DIRECT_CLIENT_ID).unwrap().item_count(), 0);

        assert!(manager.reclaim_direct(at(200)).is_empty());
        assert_eq!(manager.reclaim_direct(at(100 + 26 * 3_600)), vec!["Agent".to_string()]);
    }

    #[tokio::test]
    async fn spawned_scheduler_executes_tasks() {
        let plugin = RecordingPlugin::new("Svc", Capabilities::EXPORTER | Capabilities::RUNNER)
            .with_value("42");
        let manager = manager_with(Arc::clone(&plugin), "svc.value");
        let config = SchedulerConfig {
            max_concurrency: 2,
            tick: Duration::from_millis(10),
            direct_reclaim_interval: Duration::from_secs(3_600),
        };
        let handle = spawn(manager, config);

        let (writer, mut rx) = ChannelWriter::new();
        handle.direct(Request::direct("svc.value"), Arc::new(writer)).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("result in time")
            .expect("result");
        assert_eq!(result.value.as_deref(), Some("42"));

        // 启动任务同样被执行
        let stats = handle.stats();
        for _ in 0..100 {
            if plugin.starts.load(Ordering::SeqCst) == 1 && stats.executed() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(plugin.starts.load(Ordering::SeqCst), 1);

        let status = handle.status().await.unwrap();
        assert_eq!(status[0].refcount, 1);
        assert!(stats.executed() >= 2);

        handle.shutdown().await;
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            max_concurrency: 2,
            tick: Duration::from_millis(10),
            direct_reclaim_interval: Duration::from_secs(3_600),
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..500 {
            if done() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        done()
    }

    #[tokio::test]
    async fn lifecycle_tasks_run_on_dispatcher() {
        let plugin = RecordingPlugin::new(
            "Svc",
            Capabilities::EXPORTER | Capabilities::RUNNER | Capabilities::CONFIGURATOR,
        );
        let mut registry = PluginRegistry::new();
        registry.register(plugin.clone(), &["svc.value"]).unwrap();
        let options: PluginOptions =
            [("Svc".to_string(), toml::Value::Integer(7))].into_iter().collect();
        let handle = spawn(SchedulerManager::new(registry, Arc::new(options)), fast_config());
        let stats = handle.stats();
        let sink = MemorySink::new();

        handle.update(1, vec![Request::new(1, "svc.value", "1s")], sink.clone()).await.unwrap();

        // 缓存的导出任务执行后重新排队，下一秒再次执行
        assert!(wait_until(|| sink.results().len() >= 2).await);
        assert!(stats.rearmed() >= 1);
        assert_eq!(plugin.starts.load(Ordering::SeqCst), 1);
        assert_eq!(plugin.configured(), vec![toml::Value::Integer(7)]);
        assert_eq!(plugin.stops.load(Ordering::SeqCst), 0);

        let summary = handle.update(1, Vec::new(), sink.clone()).await.unwrap();
        assert_eq!(summary.released, vec!["Svc".to_string()]);
        assert!(wait_until(|| plugin.stops.load(Ordering::SeqCst) == 1).await);

        handle.shutdown().await;
        assert_eq!(plugin.configured().len(), 1);
    }

    #[tokio::test]
    async fn collector_runs_every_period() {
        let plugin = RecordingPlugin::new("Cpu", Capabilities::COLLECTOR | Capabilities::EXPORTER)
            .with_period(1);
        let handle = spawn(manager_with(Arc::clone(&plugin), "cpu.load"), fast_config());
        let sink: SinkRef = MemorySink::new();

        handle.update(1, vec![Request::new(1, "cpu.load", "10s")], sink).await.unwrap();

        assert!(wait_until(|| plugin.collects.load(Ordering::SeqCst) >= 2).await);
        assert!(handle.stats().rearmed() >= 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn update_after_shutdown_fails() {
        let manager = SchedulerManager::new(PluginRegistry::new(), Arc::new(PluginOptions::default()));
        let handle = spawn(manager, SchedulerConfig::default());
        let tx = handle.tx.clone();
        handle.shutdown().await;

        let (reply, _rx) = oneshot::channel();
        let sink: SinkRef = MemorySink::new();
        let sent = tx.send(Command::Update { client_id: 1, requests: Vec::new(), sink, reply });
        assert!(sent.is_err());
    }
}
