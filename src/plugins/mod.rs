// ============================================================================
// AgentSched - 内置插件
// ============================================================================
//
// 文件: src/plugins/mod.rs
// 职责: 内置插件导出和默认注册表构建
//
// ============================================================================

pub mod agent;
pub mod ticker;

use std::sync::Arc;

pub use agent::AgentPlugin;
pub use ticker::TickerPlugin;

use crate::core::agent::PluginRegistry;
use crate::error::Result;

/// 注册全部内置插件
pub fn builtin_registry() -> Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(AgentPlugin), agent::METRICS)?;
    registry.register(Arc::new(TickerPlugin::default()), ticker::METRICS)?;
    Ok(registry)
}
