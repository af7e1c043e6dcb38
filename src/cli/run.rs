// ============================================================================
// AgentSched - CLI Run 命令
// ============================================================================
//
// 文件: src/cli/run.rs
// 职责: 按配置周期性提交监控项更新并输出结果
// 边界:
//   - ✅ 命令行参数定义和解析
//   - ✅ 调度器启动与停止
//   - ✅ 周期更新驱动
//   - ❌ 不应包含请求绑定逻辑
//   - ❌ 不应包含结果格式化细节
//
// ============================================================================

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::scheduler::{spawn, SchedulerManager};
use crate::models::config::Config;
use crate::models::request::{ChannelWriter, SinkRef};
use crate::plugins::builtin_registry;
use crate::ui::report::{print_cycle_summary, print_plugin_status, print_result};
use crate::utils::logger::Logger;

/// 运行调度器命令
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Stop after N update cycles (runs until interrupted when omitted)
    #[arg(short = 'n', long)]
    pub cycles: Option<u64>,

    /// Print results as JSON lines
    #[arg(long)]
    pub json: bool,
}

pub async fn handle_run(args: RunArgs, config: Config) -> Result<()> {
    let registry = builtin_registry().context("failed to register built-in plugins")?;
    let manager = SchedulerManager::new(registry, Arc::new(config.plugin_options()));
    let handle = spawn(manager, config.scheduler_config());

    let (writer, mut results) = ChannelWriter::new();
    let sink: SinkRef = Arc::new(writer);
    let json = args.json;
    let printer = tokio::spawn(async move {
        while let Some(result) = results.recv().await {
            if let Err(e) = print_result(&result, json) {
                warn!("cannot print result for item {}: {}", result.itemid, e);
            }
        }
    });

    let requests = config.requests_by_client();
    if requests.is_empty() {
        Logger::warn("no items configured, only plugin housekeeping will run");
    }
    let cycle_interval = Duration::from_secs(config.scheduler.cycle_interval);
    let mut ticker = tokio::time::interval(cycle_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut cycle = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping scheduler");
                break;
            }
            _ = ticker.tick() => {}
        }
        cycle += 1;
        // the last tick only lets the final cycle's tasks run
        if args.cycles.is_some_and(|max| cycle > max) {
            break;
        }

        for (client, items) in &requests {
            let summary = handle
                .update(*client, items.clone(), Arc::clone(&sink))
                .await
                .with_context(|| format!("update of client {} failed", client))?;
            if !json {
                print_cycle_summary(cycle, *client, &summary);
            }
        }
    }

    let statuses = handle.status().await.context("cannot query plugin status")?;
    let stats = handle.stats();
    handle.shutdown().await;
    drop(sink);
    if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
        warn!("result printer did not drain in time");
    }

    if !json {
        print_plugin_status(&statuses);
        Logger::success(format!(
            "{} tasks executed, {} re-armed",
            stats.executed(),
            stats.rearmed()
        ));
    }
    Ok(())
}
