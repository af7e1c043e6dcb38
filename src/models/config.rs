// ============================================================================
// AgentSched - 配置数据模型
// ============================================================================
//
// 文件: src/models/config.rs
// 职责: 配置文件数据结构定义和操作
// 边界:
//   - ✅ 配置文件数据结构定义
//   - ✅ 配置序列化/反序列化
//   - ✅ 配置验证和默认值
//   - ✅ 配置文件读取
//   - ✅ 命令行参数覆盖
//   - ❌ 不应包含配置应用逻辑
//   - ❌ 不应包含 CLI 参数处理
//   - ❌ 不应作为全局状态使用（以快照形式注入）
//
// ============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use crate::core::scheduler::SchedulerConfig;
use crate::models::plugin::PluginOptions;
use crate::models::request::Request;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "agentsched.toml";

/// AgentSched 配置文件结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 调度配置
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
    /// 插件配置选项（插件名 -> 选项表）
    #[serde(default)]
    pub plugins: BTreeMap<String, toml::Value>,
    /// 监控项定义
    #[serde(default)]
    pub items: Vec<ItemConfig>,
}

/// 调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// 最大并发任务数
    #[serde(default = "Config::default_max_concurrency")]
    pub max_concurrency: usize,
    /// 更新周期（秒）
    #[serde(default = "Config::default_cycle_interval")]
    pub cycle_interval: u64,
    /// 直接请求客户端回收间隔（秒）
    #[serde(default = "Config::default_direct_reclaim_interval")]
    pub direct_reclaim_interval: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别过滤
    #[serde(default = "Config::default_log_level")]
    pub level: String,
}

/// 监控项配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemConfig {
    pub itemid: u64,
    pub key: String,
    #[serde(default = "Config::default_delay")]
    pub delay: String,
    /// 所属客户端（0 保留给直接请求）
    #[serde(default = "Config::default_client")]
    pub client: u64,
}

impl ItemConfig {
    pub fn to_request(&self) -> Request {
        Request::new(self.itemid, self.key.as_str(), self.delay.as_str())
    }
}

/// CLI 运行时参数（用于覆盖配置文件）
#[derive(Debug, Clone, Default)]
pub struct RuntimeArgs {
    pub verbose: Option<bool>,
    pub max_concurrency: Option<usize>,
    pub cycle_interval: Option<u64>,
    pub log_level: Option<String>,
}

/// 配置默认值 trait
pub trait ConfigDefaults {
    /// 获取默认最大并发数
    fn default_max_concurrency() -> usize {
        num_cpus::get()
    }

    /// 获取默认更新周期
    fn default_cycle_interval() -> u64 {
        1
    }

    /// 获取默认直接请求回收间隔
    fn default_direct_reclaim_interval() -> u64 {
        60
    }

    /// 获取默认日志级别
    fn default_log_level() -> String {
        "info".to_string()
    }

    /// 获取默认检查间隔
    fn default_delay() -> String {
        "10s".to_string()
    }

    /// 获取默认客户端
    fn default_client() -> u64 {
        1
    }
}

impl ConfigDefaults for Config {}

impl Config {
    /// 加载配置文件，文件不存在时使用默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.cycle_interval == 0 {
            anyhow::bail!("scheduler.cycle_interval must be positive");
        }
        if self.scheduler.direct_reclaim_interval == 0 {
            anyhow::bail!("scheduler.direct_reclaim_interval must be positive");
        }
        if let Some(item) = self.items.iter().find(|item| item.client == 0) {
            anyhow::bail!("item {} uses reserved client id 0", item.itemid);
        }
        let mut seen = HashMap::new();
        for item in &self.items {
            if let Some(previous) = seen.insert((item.client, item.itemid), &item.key) {
                anyhow::bail!(
                    "item {} is defined twice for client {} ({} and {})",
                    item.itemid,
                    item.client,
                    previous,
                    item.key
                );
            }
        }
        Ok(())
    }

    /// 合并运行时参数
    pub fn merge_runtime_args(&mut self, args: RuntimeArgs) {
        if let Some(max_concurrency) = args.max_concurrency {
            self.scheduler.max_concurrency = max_concurrency;
        }
        if let Some(cycle_interval) = args.cycle_interval {
            self.scheduler.cycle_interval = cycle_interval.max(1);
        }
        if let Some(level) = args.log_level {
            self.log.level = level;
        }
        if args.verbose == Some(true) {
            self.log.level = "debug".to_string();
        }
    }

    /// 插件配置快照
    pub fn plugin_options(&self) -> PluginOptions {
        self.plugins.iter().map(|(name, value)| (name.clone(), value.clone())).collect()
    }

    /// 调度器运行参数
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrency: self.scheduler.max_concurrency.max(1),
            direct_reclaim_interval: Duration::from_secs(self.scheduler.direct_reclaim_interval),
            ..SchedulerConfig::default()
        }
    }

    /// 按客户端分组的监控请求
    pub fn requests_by_client(&self) -> BTreeMap<u64, Vec<Request>> {
        let mut grouped: BTreeMap<u64, Vec<Request>> = BTreeMap::new();
        for item in &self.items {
            grouped.entry(item.client).or_default().push(item.to_request());
        }
        grouped
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSection::default(),
            log: LogConfig::default(),
            plugins: BTreeMap::new(),
            items: Vec::new(),
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_concurrency: Config::default_max_concurrency(),
            cycle_interval: Config::default_cycle_interval(),
            direct_reclaim_interval: Config::default_direct_reclaim_interval(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: Config::default_log_level() }
    }
}
