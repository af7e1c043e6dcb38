// ============================================================================
// AgentSched - Ticker 内置插件
// ============================================================================
//
// 文件: src/plugins/ticker.rs
// 职责: 周期计数插件，覆盖采集、导出、启停和配置全部能力
//
// ============================================================================

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

use crate::models::plugin::{Capabilities, Plugin};

pub const METRICS: &[&str] = &["ticker.count", "ticker.step"];

/// 插件配置，对应配置文件中的 `[plugins.Ticker]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickerOptions {
    pub step: u64,
    pub period: u64,
}

impl Default for TickerOptions {
    fn default() -> Self {
        Self { step: 1, period: 5 }
    }
}

/// 周期计数插件
#[derive(Debug)]
pub struct TickerPlugin {
    count: AtomicU64,
    step: AtomicU64,
    period: AtomicU64,
    running: AtomicBool,
}

impl Default for TickerPlugin {
    fn default() -> Self {
        let options = TickerOptions::default();
        Self {
            count: AtomicU64::new(0),
            step: AtomicU64::new(options.step),
            period: AtomicU64::new(options.period),
            running: AtomicBool::new(false),
        }
    }
}

impl Plugin for TickerPlugin {
    fn name(&self) -> &str {
        "Ticker"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::COLLECTOR
            | Capabilities::EXPORTER
            | Capabilities::RUNNER
            | Capabilities::CONFIGURATOR
    }

    fn period(&self) -> u64 {
        self.period.load(Ordering::Relaxed)
    }

    fn collect(&self) -> Result<()> {
        if !self.running.load(Ordering::Relaxed) {
            return Ok(());
        }
        let step = self.step.load(Ordering::Relaxed);
        let count = self.count.fetch_add(step, Ordering::Relaxed) + step;
        debug!("ticker advanced to {}", count);
        Ok(())
    }

    fn export(&self, key: &str, _params: &[String]) -> Result<Option<String>> {
        match key {
            "ticker.count" => Ok(Some(self.count.load(Ordering::Relaxed).to_string())),
            "ticker.step" => Ok(Some(self.step.load(Ordering::Relaxed).to_string())),
            _ => Err(anyhow!("unsupported metric {}", key)),
        }
    }

    fn start(&self) {
        self.running.store(true, Ordering::Relaxed);
        info!("ticker started");
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        info!("ticker stopped at {}", self.count.load(Ordering::Relaxed));
    }

    fn configure(&self, options: &toml::Value) -> Result<()> {
        let options: TickerOptions =
            options.clone().try_into().context("invalid Ticker plugin options")?;
        if options.period == 0 {
            return Err(anyhow!("Ticker period must be positive"));
        }
        self.step.store(options.step, Ordering::Relaxed);
        self.period.store(options.period, Ordering::Relaxed);
        Ok(())
    }
}
