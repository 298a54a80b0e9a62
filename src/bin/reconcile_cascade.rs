// ==========================================
// 生产排程核心 - 级联补偿工具
// ==========================================
// 重新执行 cascade_reconciliation 中的待补偿条目
// 用法: reconcile_cascade [db_path]
// ==========================================

use production_scheduler::app::{get_default_db_path, AppState};
use production_scheduler::domain::OperatorContext;

fn main() -> anyhow::Result<()> {
    production_scheduler::logging::init();

    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(anyhow::Error::msg)?;
    let report = state
        .production_api
        .reconcile_cascade(&OperatorContext::system())?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.failed > 0 {
        anyhow::bail!("{} 条补偿仍失败", report.failed);
    }
    Ok(())
}
