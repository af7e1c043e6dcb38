// ============================================================================
// AgentSched - 插件数据模型
// ============================================================================
//
// 文件: src/models/plugin.rs
// 职责: 插件能力集合、插件实现接口和插件配置快照定义
// 边界:
//   - ✅ 插件能力标志位定义
//   - ✅ 插件实现 trait 定义
//   - ✅ 插件配置选项快照
//   - ❌ 不应包含插件注册和引用计数
//   - ❌ 不应包含任务调度逻辑
//
// ============================================================================

use anyhow::{anyhow, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::models::request::{Request, SinkRef};

bitflags! {
    /// 插件能力集合（注册时计算一次）
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// 周期性自采集
        const COLLECTOR = 1;
        /// 按监控项导出数值
        const EXPORTER = 1 << 1;
        /// 一次性启动/停止
        const RUNNER = 1 << 2;
        /// 批量实时推送
        const WATCHER = 1 << 3;
        /// 运行时配置
        const CONFIGURATOR = 1 << 4;
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .iter_names()
            .map(|(name, _)| name)
            .collect();
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// 插件实现接口
///
/// 除 `name` 与 `capabilities` 外，其余方法只会在插件声明了对应能力时被调用，
/// 且总是在工作线程上执行。
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// 采集周期（秒），仅对 Collector 有意义
    fn period(&self) -> u64 {
        1
    }

    fn collect(&self) -> Result<()> {
        Ok(())
    }

    fn export(&self, key: &str, _params: &[String]) -> Result<Option<String>> {
        Err(anyhow!("plugin {} cannot export {}", self.name(), key))
    }

    fn start(&self) {}

    fn stop(&self) {}

    fn watch(&self, _requests: &[Request], _sink: &SinkRef) {}

    fn configure(&self, _options: &toml::Value) -> Result<()> {
        Ok(())
    }
}

/// 进程级插件配置快照（插件名 -> 配置选项），只读
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginOptions(HashMap<String, toml::Value>);

impl PluginOptions {
    pub fn get(&self, plugin: &str) -> Option<&toml::Value> {
        self.0.get(plugin)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, toml::Value)> for PluginOptions {
    fn from_iter<I: IntoIterator<Item = (String, toml::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
