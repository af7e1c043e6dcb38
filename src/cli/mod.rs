// ============================================================================
// AgentSched - CLI 模块
// ============================================================================
//
// 文件: src/cli/mod.rs
// 职责: CLI 命令行接口模块入口和路由
// 边界:
//   - ✅ CLI 结构定义和命令枚举
//   - ✅ 命令行参数解析配置
//   - ✅ 配置加载与日志初始化
//   - ✅ 命令路由分发
//   - ❌ 不应包含具体命令实现逻辑
//   - ❌ 不应包含调度逻辑
//
// ============================================================================

pub mod check;
pub mod get;
pub mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::config::{Config, RuntimeArgs, DEFAULT_CONFIG_FILE};
use crate::utils::colors::Colors;
use crate::utils::logger::init_logging;
use check::{handle_check, CheckArgs};
use get::{handle_get, GetArgs};
use run::{handle_run, RunArgs};

/// AgentSched - Plugin task scheduler for a monitoring agent
#[derive(Debug, Parser)]
#[command(name = "agentsched")]
#[command(about = "Plugin task scheduler for a monitoring agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Global verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Maximum concurrency
    #[arg(short = 'j', long, global = true)]
    pub max_concurrency: Option<usize>,

    /// Update cycle interval (seconds)
    #[arg(long, global = true)]
    pub cycle_interval: Option<u64>,

    /// Log filter, e.g. info or agentsched=debug
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Commands
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the scheduler for the configured items
    Run(RunArgs),
    /// Validate configured item keys and intervals
    Check(CheckArgs),
    /// Query one metric through the direct request client
    Get(GetArgs),
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    if cli.no_color {
        Colors::set_enabled(false);
    }

    let mut config = Config::load(&cli.config)?;
    // Merge runtime args to loaded config
    config.merge_runtime_args(build_runtime_args(&cli));
    init_logging(&config.log.level);

    match cli.command {
        Commands::Run(args) => handle_run(args, config).await,
        Commands::Check(args) => handle_check(args, config),
        Commands::Get(args) => handle_get(args, config).await,
    }
}

/// Build runtime args from CLI arguments
fn build_runtime_args(cli: &Cli) -> RuntimeArgs {
    RuntimeArgs {
        verbose: if cli.verbose { Some(true) } else { None },
        max_concurrency: cli.max_concurrency,
        cycle_interval: cli.cycle_interval,
        log_level: cli.log_level.clone(),
    }
}
