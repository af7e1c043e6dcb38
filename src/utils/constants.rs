// ============================================================================
// AgentSched - 常量定义
// ============================================================================
//
// 文件: src/utils/constants.rs
// 职责: 应用级常量和终端图标
// 边界:
//   - ✅ 应用名称
//   - ✅ 终端输出图标
//   - ❌ 不应包含调度相关常量
//
// ============================================================================

/// 应用名称常量
pub const APP_NAME: &str = "AGENTSCHED";

/// 像素风格图标
pub mod icons {
    /// 成功图标
    pub const SUCCESS: &str = "✓";
    /// 错误图标
    pub const ERROR: &str = "✗";
    /// 插件图标
    pub const PLUGIN: &str = "●";
    /// 时间图标
    pub const TIME: &str = "⧖";
    /// 箭头图标
    pub const ARROW: &str = "→";
    /// 汇总图标
    pub const SUMMARY: &str = "◈";
}
