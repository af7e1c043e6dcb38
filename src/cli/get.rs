// ============================================================================
// AgentSched - CLI Get 命令
// ============================================================================
//
// 文件: src/cli/get.rs
// 职责: 通过直接请求客户端查询单个指标
// 边界:
//   - ✅ 命令行参数定义和解析
//   - ✅ 直接请求提交与结果等待
//   - ❌ 不应缓存监控项
//
// ============================================================================

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

use crate::core::scheduler::{spawn, SchedulerManager};
use crate::models::config::Config;
use crate::models::request::{AgentResult, ChannelWriter, Request, SinkRef};
use crate::plugins::builtin_registry;
use crate::ui::report::print_result;

/// 直接查询命令
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Item key, e.g. agent.hostname or ticker.count[]
    pub key: String,

    /// Seconds to wait for the value
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn handle_get(args: GetArgs, config: Config) -> Result<()> {
    let registry = builtin_registry().context("failed to register built-in plugins")?;
    let manager = SchedulerManager::new(registry, Arc::new(config.plugin_options()));
    let handle = spawn(manager, config.scheduler_config());

    let (writer, mut results) = ChannelWriter::new();
    let sink: SinkRef = Arc::new(writer);
    let outcome: Result<AgentResult> = async {
        handle
            .direct(Request::direct(args.key.as_str()), sink)
            .await
            .with_context(|| format!("cannot query {}", args.key))?;
        tokio::time::timeout(Duration::from_secs(args.timeout), results.recv())
            .await
            .with_context(|| format!("no value for {} within {}s", args.key, args.timeout))?
            .context("scheduler stopped before producing a value")
    }
    .await;
    handle.shutdown().await;

    let result = outcome?;
    print_result(&result, args.json)?;
    if let Some(error) = &result.error {
        anyhow::bail!("{}: {}", result.key, error);
    }
    Ok(())
}
