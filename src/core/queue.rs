// ============================================================================
// AgentSched - 插件任务队列
// ============================================================================
//
// 文件: src/core/queue.rs
// 职责: 单个插件的待执行任务队列，调度线程与工作线程之间唯一的共享结构
// 边界:
//   - ✅ 按计划时间排序的任务存储
//   - ✅ 任务入队、位置更新、到期出队
//   - ✅ 内部加锁保证线程安全
//   - ❌ 不应包含任务执行逻辑
//   - ❌ 不应调用插件实现
//
// ============================================================================

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::models::task::TaskRef;

/// 排序键：计划时间（None 最先）+ 任务ID
type QueueKey = (Option<DateTime<Utc>>, u64);

#[derive(Default)]
struct QueueState {
    ordered: BTreeMap<QueueKey, TaskRef>,
    index: HashMap<u64, QueueKey>,
}

impl QueueState {
    fn insert(&mut self, task: TaskRef) {
        let key = {
            let task = task.lock();
            (task.scheduled(), task.id())
        };
        if let Some(old) = self.index.insert(key.1, key) {
            self.ordered.remove(&old);
        }
        self.ordered.insert(key, task);
    }
}

/// 插件任务队列
///
/// 调用方不得在持有任务锁时调用队列方法。
#[derive(Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 任务入队，已在队列中的任务按新计划时间重新排序
    pub fn enqueue(&self, task: TaskRef) {
        self.state.lock().insert(task);
    }

    /// 任务计划时间变化后更新其位置；不在队列中（正在执行）的任务忽略
    pub fn update(&self, task: &TaskRef) {
        let id = task.lock().id();
        let mut state = self.state.lock();
        if state.index.contains_key(&id) {
            state.insert(Arc::clone(task));
        }
    }

    /// 取出一个到期的激活任务，顺带丢弃已停用的任务
    pub fn pop_due(&self, now: DateTime<Utc>) -> Option<TaskRef> {
        let mut state = self.state.lock();
        loop {
            let (&key, _) = state.ordered.first_key_value()?;
            let due = key.0.map_or(true, |at| at <= now);
            let task = state.ordered.get(&key).map(Arc::clone)?;
            let active = task.lock().is_active();
            if active && !due {
                return None;
            }
            state.ordered.remove(&key);
            state.index.remove(&key.1);
            if active {
                return Some(task);
            }
        }
    }

    /// 队列中的任务快照（按计划时间排序）
    pub fn tasks(&self) -> Vec<TaskRef> {
        self.state.lock().ordered.values().map(Arc::clone).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
