// ==========================================
// 生产排程核心 - 启动入口
// ==========================================
// 初始化数据库并输出驾驶舱快照 (JSON)
// 用法: production-scheduler [db_path] [--json-log]
// ==========================================

use production_scheduler::app::{get_default_db_path, AppState};
use production_scheduler::domain::OperatorContext;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // 初始化日志系统
    if args.iter().any(|a| a == "--json-log") {
        production_scheduler::logging::init_json();
    } else {
        production_scheduler::logging::init();
    }

    tracing::info!("==================================================");
    tracing::info!("{}", production_scheduler::APP_NAME);
    tracing::info!("系统版本: {}", production_scheduler::VERSION);
    tracing::info!("==================================================");

    let db_path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(anyhow::Error::msg)?;

    let snapshot = state.dashboard_api.snapshot(&OperatorContext::system())?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if snapshot.pending_reconciliations > 0 {
        tracing::warn!(
            pending = snapshot.pending_reconciliations,
            "存在待补偿的级联, 可运行 reconcile_cascade"
        );
    }

    Ok(())
}
