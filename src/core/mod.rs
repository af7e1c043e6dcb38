// ============================================================================
// AgentSched - Core 核心模块
// ============================================================================
//
// 文件: src/core/mod.rs
// 职责: 核心业务逻辑模块入口和导出
// 边界:
//   - ✅ 核心子模块导出
//   - ✅ 常用类型重新导出
//   - ❌ 不应包含具体业务实现
//   - ❌ 不应包含 CLI 相关逻辑
//   - ❌ 不应包含 UI 相关逻辑
//
// ============================================================================

pub mod agent;
pub mod client;
pub mod interval;
pub mod queue;
pub mod scheduler;

// 重新导出常用类型
pub use agent::{PluginAgent, PluginRegistry};
pub use client::{Client, ClientItem, ItemRef};
pub use queue::TaskQueue;
pub use scheduler::{
    spawn, PluginStatus, SchedulerConfig, SchedulerHandle, SchedulerManager, UpdateSummary,
    DIRECT_CLIENT_ID,
};
