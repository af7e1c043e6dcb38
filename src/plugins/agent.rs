// ============================================================================
// AgentSched - Agent 内置插件
// ============================================================================
//
// 文件: src/plugins/agent.rs
// 职责: 代理自身状态指标（存活、版本、主机名）
//
// ============================================================================

use anyhow::{anyhow, Result};

use crate::models::plugin::{Capabilities, Plugin};

pub const METRICS: &[&str] = &["agent.ping", "agent.version", "agent.hostname"];

/// 代理状态插件
#[derive(Debug, Default)]
pub struct AgentPlugin;

impl AgentPlugin {
    fn hostname() -> Result<String> {
        if let Ok(name) = std::env::var("HOSTNAME") {
            if !name.is_empty() {
                return Ok(name);
            }
        }
        let name = std::fs::read_to_string("/etc/hostname")
            .map_err(|e| anyhow!("cannot obtain host name: {}", e))?;
        Ok(name.trim().to_string())
    }
}

impl Plugin for AgentPlugin {
    fn name(&self) -> &str {
        "Agent"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::EXPORTER
    }

    fn export(&self, key: &str, params: &[String]) -> Result<Option<String>> {
        if !params.is_empty() {
            return Err(anyhow!("too many parameters"));
        }
        match key {
            "agent.ping" => Ok(Some("1".to_string())),
            "agent.version" => Ok(Some(env!("CARGO_PKG_VERSION").to_string())),
            "agent.hostname" => Self::hostname().map(Some),
            _ => Err(anyhow!("unsupported metric {}", key)),
        }
    }
}
