// ============================================================================
// AgentSched - 错误类型
// ============================================================================
//
// 文件: src/error.rs
// 职责: 调度核心的错误类型定义
// 边界:
//   - ✅ 可恢复错误枚举定义
//   - ✅ 错误信息格式化
//   - ❌ 不应包含错误处理策略
//   - ❌ 不应包含日志输出
//
// ============================================================================

use thiserror::Error;

/// 调度器错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// 监控项检查间隔无效
    #[error("invalid update interval \"{delay}\": {reason}")]
    InvalidInterval { delay: String, reason: String },

    /// 没有插件提供该指标
    #[error("unknown metric {key}")]
    UnknownMetric { key: String },

    /// 监控项键格式错误
    #[error("invalid item key \"{key}\": {reason}")]
    InvalidKey { key: String, reason: String },

    /// 插件执行或注册失败
    #[error("plugin {plugin}: {reason}")]
    PluginFailure { plugin: String, reason: String },

    /// 调度管理器已停止
    #[error("scheduler manager is not running")]
    ManagerStopped,
}

impl SchedulerError {
    pub fn invalid_interval(delay: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInterval { delay: delay.to_string(), reason: reason.into() }
    }

    pub fn invalid_key(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidKey { key: key.to_string(), reason: reason.into() }
    }

    pub fn plugin_failure(plugin: &str, reason: impl Into<String>) -> Self {
        Self::PluginFailure { plugin: plugin.to_string(), reason: reason.into() }
    }
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_interval_message_names_delay() {
        let err = SchedulerError::invalid_interval("5x", "unknown suffix");
        assert_eq!(err.to_string(), "invalid update interval \"5x\": unknown suffix");
    }
}
