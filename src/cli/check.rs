// ============================================================================
// AgentSched - CLI Check 命令
// ============================================================================
//
// 文件: src/cli/check.rs
// 职责: 校验配置中的监控项键与检查间隔
// 边界:
//   - ✅ 命令行参数定义和解析
//   - ✅ 监控项键路由检查
//   - ✅ 检查间隔解析检查
//   - ❌ 不应启动调度器
//
// ============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;

use crate::core::agent::PluginRegistry;
use crate::core::interval::next_check;
use crate::models::config::Config;
use crate::plugins::builtin_registry;
use crate::ui::report::{print_check_report, CheckEntry};
use crate::utils::logger::Logger;

/// 检查配置命令
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Also print the next check time of every valid item
    #[arg(short, long)]
    pub detail: bool,
}

pub fn handle_check(args: CheckArgs, config: Config) -> Result<()> {
    let registry = builtin_registry().context("failed to register built-in plugins")?;
    let now = Utc::now();

    for name in config.plugins.keys() {
        if registry.get(name).is_none() {
            Logger::warn(format!("options given for unknown plugin {}", name));
        }
    }

    let mut entries = Vec::with_capacity(config.items.len());
    for item in &config.items {
        let entry = check_item(&registry, item.itemid, &item.key, &item.delay, now);
        if args.detail {
            if let Ok(next) = next_check(item.itemid, &item.delay, false, now) {
                Logger::info(format!("[{}] next check at {}", item.itemid, next.to_rfc3339()));
            }
        }
        entries.push(entry);
    }

    let problems = print_check_report(&entries);
    if problems > 0 {
        anyhow::bail!("{} configured items have problems", problems);
    }
    Ok(())
}

/// 校验单个监控项
pub fn check_item(
    registry: &PluginRegistry,
    itemid: u64,
    key: &str,
    delay: &str,
    now: DateTime<Utc>,
) -> CheckEntry {
    let problem = registry
        .plugin_for_key(key)
        .and_then(|_| next_check(itemid, delay, false, now))
        .err()
        .map(|e| e.to_string());
    CheckEntry { itemid, key: key.to_string(), problem }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_routing_and_interval_problems() {
        let registry = builtin_registry().unwrap();
        let now = Utc::now();

        assert_eq!(check_item(&registry, 1, "agent.ping", "30s", now).problem, None);
        assert_eq!(check_item(&registry, 2, "ticker.count[]", "1m;5/1-5,09:00-18:00", now).problem, None);

        let unknown = check_item(&registry, 3, "nope.metric", "30s", now);
        assert!(unknown.problem.unwrap().contains("unknown metric"));

        let bad_delay = check_item(&registry, 4, "agent.ping", "abc", now);
        assert!(bad_delay.problem.unwrap().contains("invalid update interval"));
    }
}
