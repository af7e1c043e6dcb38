// ============================================================================
// AgentSched - 数据模型
// ============================================================================
//
// 文件: src/models/mod.rs
// 职责: 数据模型模块导出
//
// ============================================================================

pub mod config;
pub mod plugin;
pub mod request;
pub mod task;
