// ============================================================================
// AgentSched - 库入口
// ============================================================================
//
// 文件: src/lib.rs
// 职责: 模块声明和公共导出
//
// ============================================================================

pub mod cli;
pub mod core;
pub mod error;
pub mod models;
pub mod plugins;
pub mod ui;
pub mod utils;

#[cfg(test)]
mod testing;

pub use error::{Result, SchedulerError};
