// ============================================================================
// AgentSched - 程序入口
// ============================================================================
//
// 文件: src/main.rs
// 职责: 启动异步运行时并分发到 CLI
//
// ============================================================================

use agentsched::cli::run_cli;
use agentsched::utils::logger::Logger;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        Logger::error(format!("{:#}", e));
        std::process::exit(1);
    }
}
