// ============================================================================
// AgentSched - UI 模块
// ============================================================================
//
// 文件: src/ui/mod.rs
// 职责: 终端输出组件导出
//
// ============================================================================

pub mod report;
