// ============================================================================
// AgentSched - 日志工具
// ============================================================================
//
// 文件: src/utils/logger.rs
// 职责: 日志初始化和控制台输出工具
// 边界:
//   - ✅ tracing 订阅器初始化
//   - ✅ 日志级别管理
//   - ✅ 控制台输出控制
//   - ❌ 不应包含业务逻辑
//   - ❌ 不应包含文件日志写入
//
// ============================================================================

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::colors::Colors;
use super::constants::APP_NAME;

/// 初始化 tracing 订阅器
///
/// `RUST_LOG` 优先于配置中的级别；重复初始化时静默忽略。
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

/// 简单的控制台输出工具
pub struct Logger;

impl Logger {
    pub fn info<S: AsRef<str>>(msg: S) {
        println!("{} {}", Colors::info(&format!("[{}]", APP_NAME)), msg.as_ref());
    }

    pub fn warn<S: AsRef<str>>(msg: S) {
        println!("{} {}", Colors::warn("[WARN]"), msg.as_ref());
    }

    pub fn error<S: AsRef<str>>(msg: S) {
        eprintln!("{} {}", Colors::error("[ERROR]"), msg.as_ref());
    }

    pub fn success<S: AsRef<str>>(msg: S) {
        println!("{} {}", Colors::success(&format!("[{}]", APP_NAME)), msg.as_ref());
    }
}
