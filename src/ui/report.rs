// ============================================================================
// AgentSched - 结果与状态输出组件
// ============================================================================
//
// 文件: src/ui/report.rs
// 职责: 采集结果、插件状态和检查结果的终端显示
// 边界:
//   - ✅ 结果行格式化输出
//   - ✅ JSON 行输出
//   - ✅ 插件状态表格显示
//   - ✅ 周期统计汇总显示
//   - ❌ 不应包含调度逻辑
//   - ❌ 不应包含配置读取
//
// ============================================================================

use anyhow::Result;
use std::io::{self, Write};

use crate::core::scheduler::{PluginStatus, UpdateSummary};
use crate::models::request::AgentResult;
use crate::utils::colors::Colors;
use crate::utils::constants::icons;
use crate::utils::logger::Logger;

/// 检查结果中的单条记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckEntry {
    pub itemid: u64,
    pub key: String,
    pub problem: Option<String>,
}

/// 格式化单条采集结果
pub fn format_result(result: &AgentResult) -> String {
    let ts = result.ts.format("%H:%M:%S");
    match (&result.value, &result.error) {
        (_, Some(error)) => format!(
            "{} {} [{}] {} {}",
            Colors::dim(&ts.to_string()),
            Colors::error(icons::ERROR),
            result.itemid,
            result.key,
            Colors::error(error)
        ),
        (Some(value), None) => format!(
            "{} {} [{}] {} {} {}",
            Colors::dim(&ts.to_string()),
            Colors::success(icons::SUCCESS),
            result.itemid,
            result.key,
            icons::ARROW,
            value
        ),
        (None, None) => format!(
            "{} {} [{}] {} {}",
            Colors::dim(&ts.to_string()),
            Colors::success(icons::SUCCESS),
            result.itemid,
            result.key,
            Colors::dim("(no value)")
        ),
    }
}

/// 打印采集结果，`json` 为真时每行输出一个 JSON 对象
pub fn print_result(result: &AgentResult, json: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if json {
        writeln!(stdout, "{}", serde_json::to_string(result)?)?;
    } else {
        writeln!(stdout, "{}", format_result(result))?;
    }
    Ok(())
}

/// 打印周期处理汇总
pub fn print_cycle_summary(cycle: u64, client: u64, summary: &UpdateSummary) {
    let mut line = format!(
        "{} cycle {} client {}: {} bound, {} failed",
        icons::TIME,
        cycle,
        client,
        summary.bound,
        summary.failed
    );
    if !summary.released.is_empty() {
        line.push_str(&format!(", released {}", summary.released.join(", ")));
    }
    Logger::info(line);
}

/// 打印插件状态表格
pub fn print_plugin_status(statuses: &[PluginStatus]) {
    Logger::info("");
    Logger::info(Colors::bold("Plugins"));
    Logger::info("───────────────────────────────────────");
    let width = statuses.iter().map(|status| status.name.len()).max().unwrap_or(0);
    for status in statuses {
        Logger::info(format!(
            "{} {:<width$}  refs={:<3} queued={:<3} {}",
            icons::PLUGIN,
            status.name,
            status.refcount,
            status.queued,
            Colors::dim(&status.capabilities.to_string()),
            width = width
        ));
    }
}

/// 打印配置检查结果，返回问题数量
pub fn print_check_report(entries: &[CheckEntry]) -> usize {
    let mut problems = 0;
    for entry in entries {
        match &entry.problem {
            Some(problem) => {
                problems += 1;
                Logger::error(format!("[{}] {}: {}", entry.itemid, entry.key, problem));
            }
            None => Logger::info(format!(
                "{} [{}] {}",
                Colors::success(icons::SUCCESS),
                entry.itemid,
                entry.key
            )),
        }
    }

    Logger::info("");
    let summary = format!(
        "{} {} items checked, {} problems",
        icons::SUMMARY,
        entries.len(),
        problems
    );
    if problems == 0 {
        Logger::success(summary);
    } else {
        Logger::warn(summary);
    }
    let _ = io::stdout().flush();
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::Request;
    use chrono::{TimeZone, Utc};

    #[test]
    fn formats_values_and_errors() {
        Colors::set_enabled(false);
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 5).unwrap();
        let request = Request::new(7, "agent.ping", "10s");

        let ok = format_result(&AgentResult::value(&request, Some("1".into()), ts));
        assert!(ok.starts_with("12:30:05"));
        assert!(ok.contains("[7] agent.ping"));
        assert!(ok.ends_with("1"));

        let failed = format_result(&AgentResult::error(&request, "boom", ts));
        assert!(failed.contains(icons::ERROR));
        assert!(failed.ends_with("boom"));
    }

    #[test]
    fn counts_check_problems() {
        let entries = vec![
            CheckEntry { itemid: 1, key: "agent.ping".into(), problem: None },
            CheckEntry { itemid: 2, key: "nope".into(), problem: Some("unknown metric".into()) },
        ];
        assert_eq!(print_check_report(&entries), 1);
    }
}
