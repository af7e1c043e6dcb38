// ============================================================================
// AgentSched - 测试辅助
// ============================================================================
//
// 文件: src/testing.rs
// 职责: 单元测试共用的插件与结果输出替身
//
// ============================================================================

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::agent::PluginRegistry;
use crate::models::plugin::{Capabilities, Plugin};
use crate::models::request::{AgentResult, Request, ResultWriter, SinkRef};

/// 记录调用情况的插件
pub struct RecordingPlugin {
    name: String,
    capabilities: Capabilities,
    period: AtomicU64,
    value: Mutex<Option<String>>,
    fail_exports: AtomicBool,
    pub collects: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    exported: Mutex<Vec<String>>,
    watched: Mutex<Vec<usize>>,
    configured: Mutex<Vec<toml::Value>>,
}

impl RecordingPlugin {
    pub fn new(name: &str, capabilities: Capabilities) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            capabilities,
            period: AtomicU64::new(1),
            value: Mutex::new(Some("1".to_string())),
            fail_exports: AtomicBool::new(false),
            collects: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            exported: Mutex::new(Vec::new()),
            watched: Mutex::new(Vec::new()),
            configured: Mutex::new(Vec::new()),
        })
    }

    pub fn with_period(self: Arc<Self>, period: u64) -> Arc<Self> {
        self.period.store(period, Ordering::SeqCst);
        self
    }

    pub fn with_value(self: Arc<Self>, value: &str) -> Arc<Self> {
        *self.value.lock() = Some(value.to_string());
        self
    }

    pub fn failing_exports(self: Arc<Self>) -> Arc<Self> {
        self.fail_exports.store(true, Ordering::SeqCst);
        self
    }

    pub fn exported(&self) -> Vec<String> {
        self.exported.lock().clone()
    }

    /// 每次推送的批次大小
    pub fn watched(&self) -> Vec<usize> {
        self.watched.lock().clone()
    }

    pub fn configured(&self) -> Vec<toml::Value> {
        self.configured.lock().clone()
    }
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn period(&self) -> u64 {
        self.period.load(Ordering::SeqCst)
    }

    fn collect(&self) -> Result<()> {
        self.collects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn export(&self, key: &str, _params: &[String]) -> Result<Option<String>> {
        self.exported.lock().push(key.to_string());
        if self.fail_exports.load(Ordering::SeqCst) {
            return Err(anyhow!("export of {} failed", key));
        }
        Ok(self.value.lock().clone())
    }

    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn watch(&self, requests: &[Request], _sink: &SinkRef) {
        self.watched.lock().push(requests.len());
    }

    fn configure(&self, options: &toml::Value) -> Result<()> {
        self.configured.lock().push(options.clone());
        Ok(())
    }
}

/// 收集结果的输出
#[derive(Default)]
pub struct MemorySink {
    results: Mutex<Vec<AgentResult>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn results(&self) -> Vec<AgentResult> {
        self.results.lock().clone()
    }
}

impl ResultWriter for MemorySink {
    fn write(&self, result: AgentResult) {
        self.results.lock().push(result);
    }
}

/// 仅包含一个插件的注册表，指标名为插件名小写
pub fn registry_with(name: &str, capabilities: Capabilities) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    let metric = name.to_lowercase();
    registry
        .register(RecordingPlugin::new(name, capabilities), &[metric.as_str()])
        .expect("register test plugin");
    registry
}
